pub mod call_tree;
pub mod history;

pub use call_tree::{CallTree, CallTreeNode, MAX_STACK_DEPTH, StackFrame, truncated_location};
pub use history::{History, HistoryEntry};
