use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of a progress counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
}

#[derive(Debug, Default)]
struct Counts {
    total: AtomicU64,
    completed: AtomicU64,
}

/// Writer side of a migration's progress. Owned by one gate; workers only
/// ever advance it.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    counts: Arc<Counts>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing a new unit of work of `total` units.
    pub fn observe(&self, total: u64) -> ProgressHandle {
        // completed first, so a reader never sees the old count against the new total
        self.counts.completed.store(0, Ordering::SeqCst);
        self.counts.total.store(total, Ordering::SeqCst);
        self.handle()
    }

    /// Count one finished unit. Returns false once `total` is reached.
    pub fn complete_one(&self) -> bool {
        let total = self.counts.total.load(Ordering::SeqCst);
        self.counts
            .completed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |done| (done < total).then_some(done + 1))
            .is_ok()
    }

    /// Count one finished unit unless it is the last one, which is left for
    /// [`ProgressTracker::complete_one`] once the whole run has succeeded.
    pub fn complete_one_before_last(&self) -> bool {
        let total = self.counts.total.load(Ordering::SeqCst);
        self.counts
            .completed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |done| (done + 1 < total).then_some(done + 1))
            .is_ok()
    }

    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle { counts: Arc::clone(&self.counts) }
    }
}

/// Read-only view handed to callers for polling.
#[derive(Clone, Debug)]
pub struct ProgressHandle {
    counts: Arc<Counts>,
}

impl ProgressHandle {
    pub fn total(&self) -> u64 {
        self.counts.total.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.counts.completed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot { total: self.total(), completed: self.completed() }
    }

    /// 0.0 before anything was observed.
    pub fn fraction_completed(&self) -> f64 {
        let ProgressSnapshot { total, completed } = self.snapshot();
        if total == 0 {
            return 0.0;
        }
        completed as f64 / total as f64
    }

    pub fn is_finished(&self) -> bool {
        let ProgressSnapshot { total, completed } = self.snapshot();
        total > 0 && completed == total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn starts_empty() {
        let tracker = ProgressTracker::new();
        let handle = tracker.handle();
        assert_eq!(handle.snapshot(), ProgressSnapshot::default());
        assert!(!handle.is_finished());
        assert_eq!(handle.fraction_completed(), 0.0);
    }

    #[test]
    fn never_exceeds_total() {
        let tracker = ProgressTracker::new();
        let handle = tracker.observe(2);
        assert!(tracker.complete_one());
        assert!(tracker.complete_one());
        assert!(!tracker.complete_one());
        assert_eq!(handle.completed(), 2);
        assert!(handle.is_finished());
    }

    #[test]
    fn last_unit_is_held_back() {
        let tracker = ProgressTracker::new();
        let handle = tracker.observe(3);
        assert!(tracker.complete_one_before_last());
        assert!(tracker.complete_one_before_last());
        assert!(!tracker.complete_one_before_last());
        assert_eq!(handle.completed(), 2);
        assert!(!handle.is_finished());

        assert!(tracker.complete_one());
        assert!(handle.is_finished());
    }

    #[test]
    fn observe_resets_completed() {
        let tracker = ProgressTracker::new();
        tracker.observe(1);
        tracker.complete_one();
        let handle = tracker.observe(4);
        assert_eq!(handle.snapshot(), ProgressSnapshot { total: 4, completed: 0 });
        tracker.complete_one();
        assert_eq!(handle.fraction_completed(), 0.25);
    }

    #[test]
    fn concurrent_completions_are_not_lost() {
        let tracker = ProgressTracker::new();
        let handle = tracker.observe(800);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..150 {
                        tracker.complete_one();
                    }
                });
            }
        });
        assert_eq!(handle.completed(), 800);
    }
}
