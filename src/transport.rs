use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use url::form_urlencoded;

/// Errors surfaced by the underlying HTTP transport.
///
/// The collection client never retries and never swallows these; they
/// bubble to the UI-facing caller unmodified. Retry policy, timeouts and
/// authentication all live behind the [`Transport`] implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {message}")]
    Connection { message: String },

    #[error("timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error {status}: {message}")]
    HttpStatus { status: u16, message: String },

    #[error("invalid response: {reason}")]
    InvalidResponse { reason: String },
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connection { .. } => true,
            TransportError::Timeout { .. } => true,
            TransportError::HttpStatus { status, .. } => {
                matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
            }
            TransportError::InvalidResponse { .. } => false,
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, TransportError::HttpStatus { status, .. } if (400..500).contains(status))
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, TransportError::HttpStatus { status, .. } if (500..600).contains(status))
    }
}

/// The boundary to the configured HTTP client.
///
/// Implementations perform an authenticated GET against
/// `/<collection>?<query>` and return the parsed JSON body. The body has
/// no guaranteed schema; shape reconciliation is this crate's job, not
/// the transport's.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(
        &self,
        collection: &str,
        query: &[(String, String)],
    ) -> Result<Value, TransportError>;
}

/// Render query parameters as a percent-encoded query string.
///
/// Provided for transport implementations and log lines; parameter order
/// is preserved as given.
pub fn encode_query(query: &[(String, String)]) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (name, value) in query {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_query_preserves_order() {
        let query = vec![
            ("page".to_string(), "2".to_string()),
            ("limit".to_string(), "25".to_string()),
            ("status".to_string(), "pending".to_string()),
        ];
        assert_eq!(encode_query(&query), "page=2&limit=25&status=pending");
    }

    #[test]
    fn test_encode_query_escapes_values() {
        let query = vec![("department".to_string(), "R&D team".to_string())];
        assert_eq!(encode_query(&query), "department=R%26D+team");
    }

    #[test]
    fn test_encode_query_empty() {
        assert_eq!(encode_query(&[]), "");
    }

    #[test]
    fn test_error_retryable() {
        assert!(TransportError::Timeout { timeout_ms: 1000 }.is_retryable());
        assert!(TransportError::Connection {
            message: "refused".into()
        }
        .is_retryable());
        assert!(TransportError::HttpStatus {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!TransportError::HttpStatus {
            status: 404,
            message: "not found".into()
        }
        .is_retryable());
        assert!(!TransportError::InvalidResponse {
            reason: "not JSON".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_classification() {
        let not_found = TransportError::HttpStatus {
            status: 404,
            message: "not found".into(),
        };
        assert!(not_found.is_client_error());
        assert!(!not_found.is_server_error());

        let internal = TransportError::HttpStatus {
            status: 500,
            message: "boom".into(),
        };
        assert!(internal.is_server_error());
    }
}
