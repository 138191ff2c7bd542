//! Output module for exporting fetch results and reporting failures
//!
//! This module handles:
//! - Writing in-memory payloads as NDJSON files
//! - Summarising pending failures and batches from the store

mod ndjson;
pub mod stats;

pub use ndjson::save_ndjson;
pub use stats::{load_statistics, print_statistics, FailureStatistics};
