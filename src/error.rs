//! Error types for ClawCore
//!
//! This module defines all error types used throughout the ClawCore crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Provides fine-grained categorization of LLM provider failures, enabling
/// retry decisions in the agent loop without string matching. Concrete
/// provider clients map their wire errors into these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 401 — Invalid API key or authentication failure
    Auth(String),
    /// 429 — Rate limit or quota exceeded
    RateLimit(String),
    /// 500/502/503/504 — Server-side errors
    ServerError(String),
    /// 400 — Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404 — Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// Provider is overloaded — retry with backoff
    Overloaded(String),
    /// The stream finished with neither text nor tool calls
    EmptyResponse,
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::EmptyResponse => write!(f, "Empty response: no text or tool calls"),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if this error is transient and the request should be retried.
    ///
    /// Retryable errors: RateLimit, ServerError, Timeout, Overloaded, and
    /// EmptyResponse (a stream that produced nothing is treated as transient).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
                | ProviderError::EmptyResponse
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Timeout(_) => None,
            ProviderError::EmptyResponse => None,
            ProviderError::Unknown(_) => None,
        }
    }
}

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
///
/// This centralizes the mapping from HTTP status codes to error
/// classifications so that every concrete provider client produces
/// consistent typed errors.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 => ProviderError::Auth(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        529 => ProviderError::Overloaded(body.to_string()),
        500..=528 | 530..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        CoreError::Provider(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for ClawCore operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured provider error with classification for retry decisions.
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Tool execution errors (invalid parameters, execution failures, etc.)
    #[error("Tool error: {0}")]
    Tool(String),

    /// History log errors (unknown parent id, missing message, etc.)
    #[error("History error: {0}")]
    History(String),

    /// A content part the provider conversion does not recognize.
    /// Raised instead of silently dropping content.
    #[error("Unsupported content part: {0}")]
    UnsupportedContent(String),

    /// Compression failures (empty or errored summary). These abort the
    /// run rather than operate on inconsistent history.
    #[error("Compression error: {0}")]
    Compression(String),

    /// Bus request failed: handler error, missing handler, or timeout
    #[error("Bus error [{code}]: {message}")]
    Bus {
        /// Human-readable description
        message: String,
        /// Machine-readable code (e.g. "method_not_found", "timeout")
        code: String,
        /// Optional structured detail from the remote handler
        detail: Option<serde_json::Value>,
    },

    /// Message bus transport closed or overflowed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The operation was canceled via a [`CancelToken`](crate::agent::CancelToken)
    #[error("Canceled")]
    Canceled,

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Construct a bus error with a machine code and no detail payload.
    pub fn bus(code: &str, message: impl Into<String>) -> Self {
        CoreError::Bus {
            message: message.into(),
            code: code.to_string(),
            detail: None,
        }
    }
}

/// A specialized `Result` type for ClawCore operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::Config("missing model id".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing model id");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let core_err: CoreError = io_err.into();
        assert!(matches!(core_err, CoreError::Io(_)));
    }

    #[test]
    fn test_result_type() {
        fn returns_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(returns_result().unwrap(), 42);
    }

    #[test]
    fn test_error_variants() {
        // Ensure all variants can be created
        let _ = CoreError::Config("test".into());
        let _ = CoreError::Provider(ProviderError::Auth("test".into()));
        let _ = CoreError::Tool("test".into());
        let _ = CoreError::History("test".into());
        let _ = CoreError::UnsupportedContent("test".into());
        let _ = CoreError::Compression("test".into());
        let _ = CoreError::bus("timeout", "request timed out");
        let _ = CoreError::Transport("test".into());
        let _ = CoreError::Canceled;
    }

    #[test]
    fn test_bus_error_display() {
        let err = CoreError::bus("method_not_found", "no handler for session.send");
        assert_eq!(
            err.to_string(),
            "Bus error [method_not_found]: no handler for session.send"
        );
    }

    // ====================================================================
    // ProviderError tests
    // ====================================================================

    #[test]
    fn test_provider_error_display() {
        assert!(ProviderError::Auth("bad key".into())
            .to_string()
            .contains("Authentication error"));
        assert!(ProviderError::RateLimit("quota".into())
            .to_string()
            .contains("Rate limit error"));
        assert!(ProviderError::ServerError("500".into())
            .to_string()
            .contains("Server error"));
        assert!(ProviderError::InvalidRequest("bad json".into())
            .to_string()
            .contains("Invalid request"));
        assert!(ProviderError::ModelNotFound("claw-99".into())
            .to_string()
            .contains("Model not found"));
        assert!(ProviderError::Timeout("30s".into())
            .to_string()
            .contains("Timeout"));
        assert!(ProviderError::Overloaded("busy".into())
            .to_string()
            .contains("Overloaded error"));
        assert!(ProviderError::EmptyResponse
            .to_string()
            .contains("Empty response"));
    }

    #[test]
    fn test_provider_error_is_retryable() {
        // Retryable
        assert!(ProviderError::RateLimit("429".into()).is_retryable());
        assert!(ProviderError::ServerError("500".into()).is_retryable());
        assert!(ProviderError::Timeout("timeout".into()).is_retryable());
        assert!(ProviderError::Overloaded("busy".into()).is_retryable());
        assert!(ProviderError::EmptyResponse.is_retryable());

        // Not retryable
        assert!(!ProviderError::Auth("401".into()).is_retryable());
        assert!(!ProviderError::InvalidRequest("400".into()).is_retryable());
        assert!(!ProviderError::ModelNotFound("404".into()).is_retryable());
        assert!(!ProviderError::Unknown("???".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_status_code() {
        assert_eq!(ProviderError::Auth("x".into()).status_code(), Some(401));
        assert_eq!(
            ProviderError::RateLimit("x".into()).status_code(),
            Some(429)
        );
        assert_eq!(
            ProviderError::ServerError("x".into()).status_code(),
            Some(500)
        );
        assert_eq!(
            ProviderError::InvalidRequest("x".into()).status_code(),
            Some(400)
        );
        assert_eq!(
            ProviderError::ModelNotFound("x".into()).status_code(),
            Some(404)
        );
        assert_eq!(
            ProviderError::Overloaded("x".into()).status_code(),
            Some(503)
        );
        assert_eq!(ProviderError::Timeout("x".into()).status_code(), None);
        assert_eq!(ProviderError::EmptyResponse.status_code(), None);
        assert_eq!(ProviderError::Unknown("x".into()).status_code(), None);
    }

    #[test]
    fn test_parse_provider_error() {
        assert!(matches!(
            parse_provider_error(401, "invalid api key"),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            parse_provider_error(429, "rate limited"),
            ProviderError::RateLimit(_)
        ));
        assert!(matches!(
            parse_provider_error(400, "bad json"),
            ProviderError::InvalidRequest(_)
        ));
        assert!(matches!(
            parse_provider_error(404, "model not found"),
            ProviderError::ModelNotFound(_)
        ));
        assert!(matches!(
            parse_provider_error(500, "internal server error"),
            ProviderError::ServerError(_)
        ));
        assert!(matches!(
            parse_provider_error(529, "overloaded"),
            ProviderError::Overloaded(_)
        ));
        assert!(matches!(
            parse_provider_error(302, "redirect"),
            ProviderError::Unknown(_)
        ));
    }

    #[test]
    fn test_provider_error_into_core_error() {
        let pe = ProviderError::RateLimit("too fast".into());
        let ce: CoreError = pe.into();
        assert!(matches!(ce, CoreError::Provider(_)));
        assert!(ce.to_string().contains("Rate limit error"));
    }
}
