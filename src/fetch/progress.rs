//! Download progress accounting
//!
//! The total grows while pagination discovers pages, so the percentage is an
//! approximation rather than a bound.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: usize,
    pub total: usize,
}

impl ProgressSnapshot {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }
}

/// Completed/total counter shared by the workers of one run
#[derive(Debug)]
pub struct Progress {
    task: String,
    counts: Mutex<ProgressSnapshot>,
    log_every: usize,
}

impl Progress {
    pub fn new(task: impl Into<String>, total: usize, log_every: usize) -> Self {
        Self {
            task: task.into(),
            counts: Mutex::new(ProgressSnapshot {
                completed: 0,
                total,
            }),
            log_every: log_every.max(1),
        }
    }

    /// Accounts for newly enqueued URLs
    pub fn add(&self, count: usize) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.total += count;
    }

    /// Removes a duplicate that was discarded after dequeue
    pub fn discard(&self) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.total = counts.total.saturating_sub(1).max(counts.completed);
    }

    /// Records one URL reaching its terminal outcome
    pub fn complete(&self) -> ProgressSnapshot {
        let snapshot = {
            let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
            counts.completed += 1;
            counts.total = counts.total.max(counts.completed);
            *counts
        };

        if snapshot.completed % self.log_every == 0 {
            self.log(snapshot);
        }
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Logs the final state of the run
    pub fn finish(&self) {
        self.log(self.snapshot());
    }

    fn log(&self, snapshot: ProgressSnapshot) {
        tracing::info!(
            "{}: {}/{} ({:.1}%)",
            self.task,
            snapshot.completed,
            snapshot.total,
            snapshot.percentage()
        );
    }
}
