//! Coleta: bounded, resumable fetching for legislative open-data APIs
//!
//! This crate downloads large fan-outs of JSON and HTML resources from the
//! Chamber of Deputies, Senate and Electoral Court portals. It follows
//! `pagina`-style pagination, retries failed requests a bounded number of
//! times and records URLs that exhausted their retries so the next batch can
//! resume them.

pub mod config;
pub mod fetch;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Coleta operations
#[derive(Debug, Error)]
pub enum ColetaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Pagination contract changed: {0}")]
    Pagination(#[from] PaginationError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Fetch worker failed: {0}")]
    Worker(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors raised while expanding pagination links
///
/// Any of these means the upstream navigation contract no longer matches
/// what the expander understands, so the whole fetch is aborted.
#[derive(Debug, Error)]
pub enum PaginationError {
    #[error("Invalid pagination link '{url}': {source}")]
    InvalidLink {
        url: String,
        source: ::url::ParseError,
    },

    #[error("Non-numeric page parameter '{param}={value}' in {url}")]
    InvalidPageNumber {
        url: String,
        param: String,
        value: String,
    },
}

/// Result type alias for Coleta operations
pub type Result<T> = std::result::Result<T, ColetaError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetch::{FetchJob, FetchReport, FetchResults, Fetcher, SinkMode};
pub use state::{FailureKind, FetchOutcome, FetchRequest, Payload, PayloadKind};
pub use storage::{FailureStore, SharedStore, SqliteStorage};
