//! HTTP client and single-attempt fetching
//!
//! This module handles one request at a time:
//! - Building the HTTP client with the configured user agent and timeout
//! - Issuing a GET and classifying whatever goes wrong
//! - Decoding the body as JSON or as an HTML page
//!
//! Retrying is left to the worker pool.

use crate::config::{FetcherConfig, UserAgentConfig};
use crate::state::{FailureKind, HtmlPage, Payload, PayloadKind};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Client;
use scraper::{Html, Selector};
use std::fmt;
use std::time::Duration;

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl AttemptFailure {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Builds the HTTP client shared by every worker
///
/// # Arguments
///
/// * `user_agent` - Identification sent with every request
/// * `fetcher` - Provides the per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    user_agent: &UserAgentConfig,
    fetcher: &FetcherConfig,
) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(fetcher.timeout_secs);

    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .pool_max_idle_per_host(fetcher.concurrency)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs one GET and decodes the body
///
/// | Condition | Failure kind |
/// |-----------|--------------|
/// | Request exceeded the timeout | `Timeout` |
/// | DNS, connection or body read error | `TransportError` |
/// | Non-2xx status | `HttpError(status)` |
/// | Malformed JSON or blank HTML page | `DecodeError` |
pub async fn fetch_once(
    client: &Client,
    url: &str,
    kind: PayloadKind,
) -> Result<Payload, AttemptFailure> {
    let response = client
        .get(url)
        .header(ACCEPT, accept_header(kind))
        .send()
        .await
        .map_err(|e| AttemptFailure::new(classify_error(&e), e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AttemptFailure::new(
            FailureKind::HttpError(status.as_u16()),
            format!("{} returned {}", url, status),
        ));
    }

    // `text()` honours the charset declared in Content-Type
    match kind {
        PayloadKind::Json => {
            let body = response
                .bytes()
                .await
                .map_err(|e| AttemptFailure::new(classify_error(&e), e.to_string()))?;
            decode_json(&body)
        }
        PayloadKind::Html => {
            let body = response
                .text()
                .await
                .map_err(|e| AttemptFailure::new(classify_error(&e), e.to_string()))?;
            decode_html(body)
        }
    }
}

fn accept_header(kind: PayloadKind) -> HeaderValue {
    match kind {
        PayloadKind::Json => HeaderValue::from_static("application/json"),
        PayloadKind::Html => HeaderValue::from_static("text/html,application/xhtml+xml"),
    }
}

fn classify_error(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::TransportError
    }
}

/// Decodes a JSON response body
pub fn decode_json(body: &[u8]) -> Result<Payload, AttemptFailure> {
    serde_json::from_slice(body)
        .map(Payload::Json)
        .map_err(|e| AttemptFailure::new(FailureKind::DecodeError, format!("invalid JSON: {}", e)))
}

/// Wraps an already decoded HTML page; only a blank page is rejected
pub fn decode_html(html: String) -> Result<Payload, AttemptFailure> {
    if html.trim().is_empty() {
        return Err(AttemptFailure::new(FailureKind::DecodeError, "empty page"));
    }
    let document = Html::parse_document(&html);
    Ok(Payload::Html(HtmlPage {
        title: extract_title(&document),
        html,
    }))
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}
