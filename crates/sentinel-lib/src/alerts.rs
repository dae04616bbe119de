//! Offender alert deduplication
//!
//! Remembers every source address that has been surfaced as anomalous so
//! each one is reported as new exactly once. State lives in memory only; a
//! process restart forgets all previously alerted addresses.

use std::collections::{BTreeSet, HashSet};
use std::sync::Mutex;
use tracing::debug;

/// Tracks which offending addresses were already reported
#[derive(Debug, Default)]
pub struct AlertTracker {
    alerted: Mutex<HashSet<String>>,
}

impl AlertTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the offenders not alerted before and mark all of them alerted
    ///
    /// The check and the update happen under one lock, so two overlapping
    /// calls never both report the same address.
    pub fn diff_and_update<'a, I>(&self, offenders: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut alerted = self.alerted.lock().unwrap_or_else(|e| e.into_inner());
        let fresh: BTreeSet<String> = offenders
            .into_iter()
            .filter(|addr| alerted.insert((*addr).to_string()))
            .map(str::to_string)
            .collect();

        if !fresh.is_empty() {
            debug!(new = fresh.len(), total = alerted.len(), "Recorded new offenders");
        }
        fresh
    }

    pub fn is_alerted(&self, address: &str) -> bool {
        self.alerted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(address)
    }

    /// Number of distinct addresses alerted so far
    pub fn alerted_count(&self) -> usize {
        self.alerted.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_each_address_new_once() {
        let tracker = AlertTracker::new();

        let first = tracker.diff_and_update(["10.0.0.45", "45.33.22.11"]);
        assert_eq!(
            first.into_iter().collect::<Vec<_>>(),
            vec!["10.0.0.45".to_string(), "45.33.22.11".to_string()]
        );

        let second = tracker.diff_and_update(["10.0.0.45", "45.33.22.11"]);
        assert!(second.is_empty());
    }

    #[test]
    fn test_partial_overlap() {
        let tracker = AlertTracker::new();
        tracker.diff_and_update(["a"]);

        let fresh = tracker.diff_and_update(["a", "b"]);
        assert_eq!(fresh.len(), 1);
        assert!(fresh.contains("b"));
        assert!(tracker.is_alerted("a"));
        assert!(tracker.is_alerted("b"));
        assert_eq!(tracker.alerted_count(), 2);
    }

    #[test]
    fn test_duplicates_in_one_call() {
        let tracker = AlertTracker::new();
        let fresh = tracker.diff_and_update(["a", "a", "a"]);
        assert_eq!(fresh.len(), 1);
    }

    #[test]
    fn test_concurrent_callers_never_share_an_address() {
        let tracker = Arc::new(AlertTracker::new());
        let addresses: Vec<String> = (0..200).map(|i| format!("10.1.0.{}", i)).collect();
        let addresses = Arc::new(addresses);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                let addresses = Arc::clone(&addresses);
                thread::spawn(move || tracker.diff_and_update(addresses.iter().map(String::as_str)))
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap().len()).sum();
        assert_eq!(total, 200);
        assert_eq!(tracker.alerted_count(), 200);
    }
}
