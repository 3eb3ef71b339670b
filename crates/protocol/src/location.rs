use serde::{Deserialize, Serialize};

use crate::shared_str::SharedStr;

/// Identity of a code position in a call tree: function, file and line.
///
/// Two locations are the same node key only when all three fields match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub name: SharedStr,
    pub file: SharedStr,
    /// `None` when unknown, and for the synthetic root.
    pub line: Option<u32>,
}

impl SourceLocation {
    pub fn new(name: impl Into<SharedStr>, file: impl Into<SharedStr>, line: u32) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            line: Some(line),
        }
    }

    /// A location whose line number is not known.
    pub fn unlined(name: impl Into<SharedStr>, file: impl Into<SharedStr>) -> Self {
        Self {
            name: name.into(),
            file: file.into(),
            line: None,
        }
    }

    /// Sentinel location carried by every tree root.
    pub fn root() -> Self {
        Self::unlined("<root>", "")
    }

    pub fn is_root(&self) -> bool {
        self.line.is_none() && self.file.is_empty() && self.name == "<root>"
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.file.is_empty(), self.line) {
            (true, _) => write!(f, "{}", self.name),
            (false, Some(line)) => write!(f, "{} ({}:{line})", self.name, self.file),
            (false, None) => write!(f, "{} ({})", self.name, self.file),
        }
    }
}
