use std::collections::VecDeque;
use std::collections::vec_deque;
use std::sync::Arc;

use tprofile_protocol::Timestamp;

use super::CallTree;

/// A frozen cycle: the tree accumulated during one cycle interval, stamped
/// with the time the cycle closed.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub timestamp: Timestamp,
    pub tree: Arc<CallTree>,
}

/// Bounded, timestamp-ordered ring of frozen call trees.
///
/// Appends are in cycle order, so entries stay sorted and range lookups can
/// binary search. When full, the oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// `capacity` is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> vec_deque::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Append an entry, returning the evicted one if the ring was full.
    ///
    /// A timestamp older than the newest entry is raised to it so the ring
    /// stays sorted.
    pub fn push(&mut self, timestamp: Timestamp, tree: Arc<CallTree>) -> Option<HistoryEntry> {
        let timestamp = self
            .entries
            .back()
            .map_or(timestamp, |last| timestamp.max(last.timestamp));
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(HistoryEntry { timestamp, tree });
        evicted
    }

    /// Entries with `start <= timestamp < stop`. `None` bounds are open.
    pub fn range(
        &self,
        start: Option<Timestamp>,
        stop: Option<Timestamp>,
    ) -> vec_deque::Iter<'_, HistoryEntry> {
        let lo = start.map_or(0, |s| self.entries.partition_point(|e| e.timestamp < s));
        let hi = stop.map_or(self.entries.len(), |s| {
            self.entries.partition_point(|e| e.timestamp < s)
        });
        self.entries.range(lo..hi.max(lo))
    }

    /// Entries with `start < timestamp < stop`, both ends exclusive.
    pub fn between(&self, start: Timestamp, stop: Timestamp) -> vec_deque::Iter<'_, HistoryEntry> {
        let lo = self.entries.partition_point(|e| e.timestamp <= start);
        let hi = self.entries.partition_point(|e| e.timestamp < stop);
        self.entries.range(lo..hi.max(lo))
    }
}
