//! Storage module for the durable failure-tracking store
//!
//! This module handles all database operations of the fetch layer:
//! - SQLite database initialization and schema management
//! - Batch (lote) tracking
//! - Pending failure records used to resume URLs in the next run

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{FailureStore, StorageError, StorageResult};

use crate::state::FailureKind;
use crate::ColetaError;

use std::path::Path;
use std::sync::{Arc, Mutex};

/// Store handle shared between the fetcher and its callers
pub type SharedStore = Arc<Mutex<dyn FailureStore + Send>>;

/// Opens (creating if needed) the SQLite store and wraps it for sharing
pub fn open_shared_storage(path: &Path) -> Result<SharedStore, ColetaError> {
    let storage = SqliteStorage::new(path)?;
    Ok(Arc::new(Mutex::new(storage)))
}

/// A URL that failed every attempt for a task, persisted for resumption
#[derive(Debug, Clone, PartialEq)]
pub struct PendingFailureRecord {
    pub id: i64,
    pub task_id: String,
    pub url: String,
    /// Batch that first recorded the failure
    pub batch_id: i64,
    /// Most recent batch that failed the URL again
    pub last_batch_id: i64,
    pub error_kind: FailureKind,
    pub attempts: u32,
    /// Number of runs that ended with this URL failed
    pub failure_count: u32,
    pub recorded_at: String,
    pub last_failed_at: String,
}

/// Represents one pipeline execution
#[derive(Debug, Clone)]
pub struct BatchRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: BatchStatus,
}

/// Status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Running,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
