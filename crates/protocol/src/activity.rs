use serde::{Deserialize, Serialize};

/// Seconds since the UNIX epoch.
pub type Timestamp = f64;

/// Number of samples collected during one cycle, stamped with the cycle's end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CountPoint {
    pub timestamp: Timestamp,
    pub count: u64,
}

impl CountPoint {
    pub fn new(timestamp: Timestamp, count: u64) -> Self {
        Self { timestamp, count }
    }
}

/// Coarse activity-over-time series for a query window.
///
/// One point per history cycle in the window, plus a trailing point for the
/// still-open cycle when the window is open-ended.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileMetadata {
    pub counts: Vec<CountPoint>,
}

impl ProfileMetadata {
    /// Samples across every point in the series.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|p| p.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}
