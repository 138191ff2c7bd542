//! Statistics generation from the failure store
//!
//! This module provides functionality for extracting and displaying
//! pending failure statistics from the storage layer.

use crate::state::FailureKind;
use crate::storage::{BatchRecord, FailureStore};
use crate::ColetaError;
use std::collections::HashMap;

/// Pending failure statistics
#[derive(Debug, Clone)]
pub struct FailureStatistics {
    /// Total number of pending failures across tasks
    pub total_pending: u64,

    /// Pending failures per task
    pub pending_by_task: HashMap<String, u64>,

    /// Pending failures per last observed failure kind
    pub pending_by_kind: HashMap<FailureKind, u64>,

    /// URLs that failed in more than one run
    pub repeated_failures: u64,

    /// Most recent batch, if any ran
    pub latest_batch: Option<BatchRecord>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(FailureStatistics)` - Successfully loaded statistics
/// * `Err(ColetaError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn FailureStore) -> Result<FailureStatistics, ColetaError> {
    let total_pending = storage.count_pending(None)?;
    let pending_by_task = storage.pending_by_task()?;

    let mut pending_by_kind = HashMap::new();
    let mut repeated_failures = 0;
    for task in pending_by_task.keys() {
        for record in storage.load_pending(task)? {
            *pending_by_kind.entry(record.error_kind).or_insert(0) += 1;
            if record.failure_count > 1 {
                repeated_failures += 1;
            }
        }
    }

    let latest_batch = storage.get_latest_batch()?;

    Ok(FailureStatistics {
        total_pending,
        pending_by_task,
        pending_by_kind,
        repeated_failures,
        latest_batch,
    })
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &FailureStatistics) {
    println!("=== Fetch Statistics ===\n");

    match &stats.latest_batch {
        Some(batch) => {
            println!("Latest batch:");
            println!("  ID: {}", batch.id);
            println!("  Status: {}", batch.status.to_db_string());
            println!("  Started: {}", batch.started_at);
            if let Some(finished) = &batch.finished_at {
                println!("  Finished: {}", finished);
            }
        }
        None => println!("No batches recorded yet."),
    }
    println!();

    println!("Pending failures: {}", stats.total_pending);
    if stats.total_pending == 0 {
        return;
    }

    println!();
    println!("By task:");
    let mut task_counts: Vec<_> = stats.pending_by_task.iter().collect();
    task_counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    for (task, count) in task_counts {
        println!("  {}: {}", task, count);
    }
    println!();

    println!("By failure kind:");
    let mut kind_counts: Vec<_> = stats.pending_by_kind.iter().collect();
    kind_counts.sort_by(|a, b| b.1.cmp(a.1));
    for (kind, count) in kind_counts {
        let percentage = (*count as f64 / stats.total_pending as f64) * 100.0;
        println!("  {}: {} ({:.1}%)", kind, count, percentage);
    }
    println!();

    println!(
        "Failed in more than one run: {} / {}",
        stats.repeated_failures, stats.total_pending
    );
}
