//! Requests, payloads and outcomes flowing through the fetch layer

use super::FailureKind;
use serde::Deserialize;
use std::sync::Arc;

/// How a response body must be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// REST API response, decoded as JSON
    #[default]
    Json,
    /// Server-rendered portal page
    Html,
}

impl PayloadKind {
    /// File extension used when payloads are written to disk
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

/// One URL to fetch, tagged with the task and batch it belongs to
///
/// Immutable once created. The task name is shared between every request of
/// a run, so it is reference counted rather than cloned per URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub task_id: Arc<str>,
    pub batch_id: i64,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, task_id: Arc<str>, batch_id: i64) -> Self {
        Self {
            url: url.into(),
            task_id,
            batch_id,
        }
    }

    /// Builds a request for a URL discovered while processing this one
    pub fn continuation(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            task_id: Arc::clone(&self.task_id),
            batch_id: self.batch_id,
        }
    }
}

/// A decoded portal page
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlPage {
    /// Contents of the `<title>` element, if any
    pub title: Option<String>,
    pub html: String,
}

/// A successfully decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Html(HtmlPage),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Json(_) => PayloadKind::Json,
            Self::Html(_) => PayloadKind::Html,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Html(_) => None,
        }
    }
}

/// A URL that exhausted its attempts
#[derive(Debug, Clone, PartialEq)]
pub struct FetchFailure {
    pub request: FetchRequest,
    /// Classification of the last attempt
    pub kind: FailureKind,
    /// Attempts made for this URL in this run
    pub attempts: u32,
    /// Human readable detail of the last attempt
    pub detail: String,
}

/// Terminal result of one `FetchRequest`
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Success {
        request: FetchRequest,
        payload: Payload,
    },
    Failure(FetchFailure),
}

impl FetchOutcome {
    pub fn request(&self) -> &FetchRequest {
        match self {
            Self::Success { request, .. } => request,
            Self::Failure(failure) => &failure.request,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_continuation_keeps_task_and_batch() {
        let seed = FetchRequest::new("http://x/a?pagina=1", Arc::from("extract_camara_frentes"), 7);
        let next = seed.continuation("http://x/a?pagina=2");

        assert_eq!(next.url, "http://x/a?pagina=2");
        assert_eq!(next.task_id, seed.task_id);
        assert_eq!(next.batch_id, 7);
    }

    #[test]
    fn test_payload_kind() {
        let json = Payload::Json(json!({"dados": []}));
        assert_eq!(json.kind(), PayloadKind::Json);
        assert!(json.as_json().is_some());

        let html = Payload::Html(HtmlPage {
            title: None,
            html: "<p>oi</p>".to_string(),
        });
        assert_eq!(html.kind(), PayloadKind::Html);
        assert!(html.as_json().is_none());
        assert_eq!(PayloadKind::Html.extension(), "html");
    }

    #[test]
    fn test_outcome_accessors() {
        let request = FetchRequest::new("http://x/b", Arc::from("t"), 1);
        let failure = FetchOutcome::Failure(FetchFailure {
            request: request.clone(),
            kind: FailureKind::HttpError(500),
            attempts: 3,
            detail: "HTTP 500".to_string(),
        });

        assert!(!failure.is_success());
        assert_eq!(failure.request(), &request);
    }
}
