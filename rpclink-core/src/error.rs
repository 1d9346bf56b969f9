use crate::envelope::{ErrorCode, ErrorShape};
use serde_json::Value;
use thiserror::Error;

/// A network or HTTP level failure reported by the host HTTP client.
///
/// `status` is `0` when no response was received at all.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub status: u16,
    pub status_text: String,
    pub body: Option<Value>,
    pub message: String,
}

impl TransportError {
    /// Builds the error, keeping a server supplied `message` from the body when
    /// there is one.
    pub fn new(status: u16, status_text: impl Into<String>, body: Option<Value>) -> Self {
        let status_text = status_text.into();
        let message = body
            .as_ref()
            .and_then(|body| body.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| generic_message(status, &status_text));
        TransportError {
            status,
            status_text,
            body,
            message,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        TransportError {
            status: 0,
            status_text: "Unknown Error".to_string(),
            body: None,
            message: message.into(),
        }
    }
}

fn generic_message(status: u16, status_text: &str) -> String {
    if status_text.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {} {}", status, status_text)
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("{}", .shape.message)]
    Server {
        shape: ErrorShape,
        status: Option<u16>,
    },
    #[error("Malformed response (HTTP {status}): {reason}")]
    MalformedResponse { status: u16, reason: String },
    #[error("{0}")]
    UnsupportedOperation(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("No procedure `{0}` in contract")]
    UnknownProcedure(String),
    #[error("Operation aborted")]
    Aborted,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    pub fn unsupported(message: impl Into<String>) -> Self {
        ClientError::UnsupportedOperation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ClientError::Configuration(message.into())
    }

    pub fn server(shape: ErrorShape, status: Option<u16>) -> Self {
        ClientError::Server { shape, status }
    }

    /// HTTP status behind the failure, if one was observed.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ClientError::Transport(err) if err.status != 0 => Some(err.status),
            ClientError::Server { shape, status } => status.or_else(|| shape.http_status()),
            ClientError::MalformedResponse { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Server supplied error code, if the failure came from an error envelope.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Server { shape, .. } => Some(shape.code),
            _ => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ClientError::Aborted)
    }

    /// Whether a caller-owned retry policy may try the call again.
    ///
    /// Nothing in this workspace retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(err) => err.status == 0 || err.status >= 500,
            ClientError::Server { .. } => self.http_status().is_some_and(|status| status >= 500),
            ClientError::MalformedResponse { .. } => true,
            ClientError::UnsupportedOperation(_)
            | ClientError::Configuration(_)
            | ClientError::UnknownProcedure(_)
            | ClientError::Aborted
            | ClientError::Serialization(_) => false,
        }
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_error_prefers_server_message() {
        let err = TransportError::new(
            500,
            "Internal Server Error",
            Some(json!({"message": "Internal error"})),
        );
        assert_eq!(err.to_string(), "Internal error");
        assert_eq!(err.status, 500);
    }

    #[test]
    fn test_transport_error_generic_message() {
        let err = TransportError::new(502, "Bad Gateway", Some(json!("<html>")));
        assert_eq!(err.to_string(), "HTTP 502 Bad Gateway");

        let err = TransportError::new(503, "", None);
        assert_eq!(err.to_string(), "HTTP 503");
    }

    #[test]
    fn test_server_error_accessors() {
        let shape = ErrorShape::new(ErrorCode::BadRequest, "Invalid user data")
            .with_data(json!({"code": "BAD_REQUEST", "httpStatus": 400}));
        let err = ClientError::server(shape, None);

        assert_eq!(err.to_string(), "Invalid user data");
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(err.code(), Some(ErrorCode::BadRequest));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_classification() {
        assert!(ClientError::from(TransportError::network("connection refused")).is_retryable());
        assert!(ClientError::from(TransportError::new(500, "Internal Server Error", None))
            .is_retryable());
        assert!(!ClientError::from(TransportError::new(404, "Not Found", None)).is_retryable());
        assert!(!ClientError::unsupported("Subscriptions are unsupported").is_retryable());
        assert!(!ClientError::Aborted.is_retryable());
        assert!(ClientError::Aborted.is_aborted());
        assert_eq!(ClientError::from(TransportError::network("down")).http_status(), None);
    }
}
