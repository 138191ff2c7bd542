//! Configuration module for Coleta
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! The resulting [`Config`] is built once at process entry and handed down
//! explicitly to every component.
//!
//! # Example
//!
//! ```no_run
//! use coleta::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("coleta.toml")).unwrap();
//! println!("Fetching with {} workers", config.fetcher.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetcherConfig, OutputConfig, StoreKind, TaskConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
