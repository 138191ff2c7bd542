//! Storage traits and error types
//!
//! This module defines the trait interface for the failure-tracking store and
//! associated error types.

use crate::state::FailureKind;
use crate::storage::{BatchRecord, BatchStatus, PendingFailureRecord};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Batch not found: {0}")]
    BatchNotFound(i64),

    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for the durable batch and failure-tracking store
///
/// Every write is a single statement, so concurrent task invocations sharing
/// one database rely on the engine's per-statement atomicity.
pub trait FailureStore {
    // ===== Batch Management =====

    /// Opens a new batch and returns its id
    fn create_batch(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a batch by ID
    fn get_batch(&self, batch_id: i64) -> StorageResult<BatchRecord>;

    /// Gets the most recent batch
    fn get_latest_batch(&self) -> StorageResult<Option<BatchRecord>>;

    /// Updates the status of a batch
    fn update_batch_status(&mut self, batch_id: i64, status: BatchStatus) -> StorageResult<()>;

    /// Marks a batch as completed with a finish timestamp
    fn complete_batch(&mut self, batch_id: i64) -> StorageResult<()>;

    // ===== Pending Failures =====

    /// Records a URL that exhausted its attempts
    ///
    /// Keeps one row per `(task_id, url)`. When the pair is already pending,
    /// the first failing batch is preserved and only the latest-failure
    /// columns are refreshed.
    fn record_failure(
        &mut self,
        task_id: &str,
        url: &str,
        batch_id: i64,
        kind: FailureKind,
        attempts: u32,
    ) -> StorageResult<()>;

    /// Loads every pending failure of a task, oldest first
    fn load_pending(&self, task_id: &str) -> StorageResult<Vec<PendingFailureRecord>>;

    /// Deletes the pending record of a URL; returns whether one existed
    fn resolve_failure(&mut self, task_id: &str, url: &str) -> StorageResult<bool>;

    /// Deletes every pending record of a task; returns how many were removed
    fn clear_pending(&mut self, task_id: &str) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Counts pending failures, optionally restricted to one task
    fn count_pending(&self, task_id: Option<&str>) -> StorageResult<u64>;

    /// Counts pending failures grouped by task
    fn pending_by_task(&self) -> StorageResult<HashMap<String, u64>>;
}
