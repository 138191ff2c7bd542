//! State module for the values exchanged by the fetch layer
//!
//! # Components
//!
//! - `FetchRequest`: a URL tagged with its task and batch
//! - `FetchOutcome`: the terminal success or failure of one request
//! - `FailureKind`: classification of a failed attempt
//! - `Payload`: a decoded JSON document or HTML page

mod failure_kind;
mod outcome;

// Re-export main types
pub use failure_kind::FailureKind;
pub use outcome::{FetchFailure, FetchOutcome, FetchRequest, HtmlPage, Payload, PayloadKind};
