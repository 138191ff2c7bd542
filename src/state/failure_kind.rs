//! Failure classification for fetch attempts
//!
//! This module defines how a single failed attempt is classified and how the
//! classification is stored in the pending failure table.

use std::fmt;

/// Why an attempt to fetch a URL failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// The request exceeded its wall clock timeout
    Timeout,

    /// The server answered with a non-2xx status
    HttpError(u16),

    /// DNS, connection, TLS or body transfer failure
    TransportError,

    /// The body could not be decoded as the declared payload kind
    DecodeError,
}

impl FailureKind {
    /// Returns true if another attempt may succeed
    ///
    /// A malformed payload will not become well-formed on retry, so
    /// `DecodeError` is terminal after one attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::DecodeError)
    }

    /// Converts the kind to its database string representation
    pub fn to_db_string(&self) -> String {
        match self {
            Self::Timeout => "timeout".to_string(),
            Self::HttpError(status) => format!("http_{}", status),
            Self::TransportError => "transport".to_string(),
            Self::DecodeError => "decode".to_string(),
        }
    }

    /// Parses a kind from its database string representation
    ///
    /// Returns None if the string doesn't match any known kind.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(Self::Timeout),
            "transport" => Some(Self::TransportError),
            "decode" => Some(Self::DecodeError),
            other => other
                .strip_prefix("http_")
                .and_then(|status| status.parse().ok())
                .map(Self::HttpError),
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::HttpError(status) => write!(f, "HTTP {}", status),
            Self::TransportError => write!(f, "transport error"),
            Self::DecodeError => write!(f, "decode error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::Timeout.is_retryable());
        assert!(FailureKind::HttpError(500).is_retryable());
        assert!(FailureKind::HttpError(404).is_retryable());
        assert!(FailureKind::TransportError.is_retryable());
        assert!(!FailureKind::DecodeError.is_retryable());
    }

    #[test]
    fn test_db_string_for_http_status() {
        assert_eq!(FailureKind::HttpError(503).to_db_string(), "http_503");
        assert_eq!(
            FailureKind::from_db_string("http_503"),
            Some(FailureKind::HttpError(503))
        );
    }

    #[test]
    fn test_from_db_string_invalid() {
        assert_eq!(FailureKind::from_db_string("invalid"), None);
        assert_eq!(FailureKind::from_db_string("http_abc"), None);
        assert_eq!(FailureKind::from_db_string("http_"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(FailureKind::HttpError(500).to_string(), "HTTP 500");
        assert_eq!(FailureKind::Timeout.to_string(), "timeout");
    }
}
