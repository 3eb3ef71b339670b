use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tprofile_protocol::{SharedStr, SourceLocation};

/// One frame of a captured stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackFrame {
    pub location: SourceLocation,
    /// Source line text, when the capturing side could read it.
    pub text: Option<SharedStr>,
}

impl StackFrame {
    pub fn new(location: SourceLocation) -> Self {
        Self {
            location,
            text: None,
        }
    }

    pub fn with_text(location: SourceLocation, text: impl Into<SharedStr>) -> Self {
        Self {
            location,
            text: Some(text.into()),
        }
    }
}

impl From<SourceLocation> for StackFrame {
    fn from(location: SourceLocation) -> Self {
        Self::new(location)
    }
}

type Children = IndexMap<SourceLocation, CallTreeNode>;

/// Deepest path [`CallTree::add_stack`] records. Frames beyond it are folded
/// into a single [`truncated_location`] node so that tree walks, which
/// recurse once per level, stay within a default thread stack.
pub const MAX_STACK_DEPTH: usize = 256;

/// Stand-in for the frames cut off below [`MAX_STACK_DEPTH`].
pub fn truncated_location() -> SourceLocation {
    SourceLocation::unlined("<truncated>", "")
}

/// A code location reached along one exact call path, with the number of
/// samples that passed through it.
///
/// Children are keyed by callee location and keep insertion order so that
/// renderers get a stable layout. Equality ignores that order and the
/// `description`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTreeNode {
    pub location: SourceLocation,
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<SharedStr>,
    #[serde(
        default,
        serialize_with = "serialize_children",
        deserialize_with = "deserialize_children"
    )]
    children: Children,
}

impl CallTreeNode {
    pub fn new(location: SourceLocation) -> Self {
        Self {
            location,
            count: 0,
            description: None,
            children: IndexMap::new(),
        }
    }

    pub fn child(&self, location: &SourceLocation) -> Option<&CallTreeNode> {
        self.children.get(location)
    }

    pub fn children(&self) -> impl ExactSizeIterator<Item = &CallTreeNode> {
        self.children.values()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Samples that ended exactly at this node.
    pub fn self_count(&self) -> u64 {
        let below: u64 = self.children.values().map(|c| c.count).sum();
        self.count.saturating_sub(below)
    }

    /// Fold `other` into this node: counts add up, matching children merge
    /// recursively, unmatched children are copied.
    pub fn absorb(&mut self, other: &CallTreeNode) {
        self.count += other.count;
        if self.description.is_none() {
            self.description.clone_from(&other.description);
        }
        for (location, theirs) in &other.children {
            match self.children.get_mut(location) {
                Some(ours) => ours.absorb(theirs),
                None => {
                    self.children.insert(location.clone(), theirs.clone());
                }
            }
        }
    }

    fn descendant_count(&self) -> usize {
        self.children
            .values()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }

    fn depth(&self) -> usize {
        self.children
            .values()
            .map(|c| 1 + c.depth())
            .max()
            .unwrap_or(0)
    }

    fn find(&self, name: &str) -> Option<&CallTreeNode> {
        self.children
            .values()
            .find_map(|c| if c.location.name == name { Some(c) } else { c.find(name) })
    }
}

impl PartialEq for CallTreeNode {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location
            && self.count == other.count
            && self.children == other.children
    }
}

impl Eq for CallTreeNode {}

fn serialize_children<S: Serializer>(children: &Children, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(children.values())
}

fn deserialize_children<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Children, D::Error> {
    let nodes = Vec::<CallTreeNode>::deserialize(deserializer)?;
    let mut children = Children::with_capacity(nodes.len());
    for node in nodes {
        match children.get_mut(&node.location) {
            Some(existing) => existing.absorb(&node),
            None => {
                children.insert(node.location.clone(), node);
            }
        }
    }
    Ok(children)
}

/// Cumulative call tree: every sampled stack is a root-to-leaf path, and
/// each node counts how many samples went through it.
///
/// The root carries [`SourceLocation::root`] and a count equal to the
/// number of stacks folded into the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallTree {
    root: CallTreeNode,
}

impl CallTree {
    pub fn new() -> Self {
        Self {
            root: CallTreeNode::new(SourceLocation::root()),
        }
    }

    pub fn root(&self) -> &CallTreeNode {
        &self.root
    }

    /// Total samples folded into this tree.
    pub fn count(&self) -> u64 {
        self.root.count
    }

    pub fn is_empty(&self) -> bool {
        self.root.count == 0 && !self.root.has_children()
    }

    /// Number of nodes below the root.
    pub fn node_count(&self) -> usize {
        self.root.descendant_count()
    }

    /// Length of the longest root-to-leaf path.
    pub fn depth(&self) -> usize {
        self.root.depth()
    }

    /// Depth-first search for the first node whose function name is `name`.
    pub fn find(&self, name: &str) -> Option<&CallTreeNode> {
        self.root.find(name)
    }

    /// Follow `path` (outermost first) from the root.
    pub fn get(&self, path: &[SourceLocation]) -> Option<&CallTreeNode> {
        path.iter()
            .try_fold(&self.root, |node, location| node.child(location))
    }

    /// Record one sampled stack, outermost frame first.
    ///
    /// Every node on the path, and the root, gains one sample. Nodes missing
    /// from the tree are created. An empty stack is ignored. Stacks deeper
    /// than [`MAX_STACK_DEPTH`] keep their outermost frames and end in a
    /// `<truncated>` node.
    pub fn add_stack(&mut self, frames: &[StackFrame]) {
        if frames.is_empty() {
            return;
        }
        self.root.count += 1;
        let kept = &frames[..frames.len().min(MAX_STACK_DEPTH)];
        let mut node = &mut self.root;
        for frame in kept {
            let child = node
                .children
                .entry(frame.location.clone())
                .or_insert_with(|| CallTreeNode {
                    description: frame.text.clone(),
                    ..CallTreeNode::new(frame.location.clone())
                });
            child.count += 1;
            node = child;
        }
        if frames.len() > MAX_STACK_DEPTH {
            let location = truncated_location();
            node.children
                .entry(location.clone())
                .or_insert_with(|| CallTreeNode::new(location))
                .count += 1;
        }
    }

    /// Fold a whole tree into this one in place.
    pub fn absorb(&mut self, other: &CallTree) {
        self.root.absorb(&other.root);
    }

    /// A new tree holding the combined counts of `a` and `b`.
    ///
    /// Neither input is modified, so merging a tree with itself simply
    /// doubles every count.
    pub fn merge(a: &CallTree, b: &CallTree) -> CallTree {
        let mut merged = a.clone();
        merged.absorb(b);
        merged
    }

    /// Merge any number of trees; zero trees give an empty tree.
    pub fn merge_all<'a, I>(trees: I) -> CallTree
    where
        I: IntoIterator<Item = &'a CallTree>,
    {
        trees.into_iter().fold(CallTree::new(), |mut acc, tree| {
            acc.absorb(tree);
            acc
        })
    }
}

impl Default for CallTree {
    fn default() -> Self {
        Self::new()
    }
}
