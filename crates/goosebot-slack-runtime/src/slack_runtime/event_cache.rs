use std::collections::{HashSet, VecDeque};

/// Bounded set of processed event keys; the oldest keys fall out first.
pub(super) struct ProcessedEventCache {
    cap: usize,
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl ProcessedEventCache {
    pub(super) fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    pub(super) fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Returns false when `key` was already recorded.
    pub(super) fn mark_processed(&mut self, key: &str) -> bool {
        if !self.index.insert(key.to_string()) {
            return false;
        }
        self.order.push_back(key.to_string());
        while self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
        true
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.order.len()
    }
}
