//! Server error types.

use faultline_core::FaultError;
use hyper::StatusCode;

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors surfaced by the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Request payload could not be read or understood.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Failure description rejected by the engine.
    #[error(transparent)]
    Fault(#[from] FaultError),

    /// invokeService called with a protocol the harness does not speak.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// Sidecar answered with an error.
    #[error("sidecar error: {0}")]
    Sidecar(String),

    /// Sidecar could not be reached.
    #[error("sidecar request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// gRPC call through the sidecar's proxy failed.
    #[error("failed to proxy request: {0}")]
    Proxy(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Harness could not start.
    #[error("startup failed: {0}")]
    Startup(String),
}

impl ServerError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a malformed-request error.
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Creates a sidecar error.
    #[must_use]
    pub fn sidecar(msg: impl Into<String>) -> Self {
        Self::Sidecar(msg.into())
    }

    /// Creates a gRPC proxy error.
    #[must_use]
    pub fn proxy(msg: impl Into<String>) -> Self {
        Self::Proxy(msg.into())
    }

    /// Creates a startup error.
    #[must_use]
    pub fn startup(msg: impl Into<String>) -> Self {
        Self::Startup(msg.into())
    }

    /// Returns true if the caller sent something unusable.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        match self {
            Self::Malformed(_) | Self::UnsupportedProtocol(_) => true,
            Self::Fault(fault) => fault.is_client_error(),
            _ => false,
        }
    }

    /// HTTP status reported to the caller for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_400() {
        assert_eq!(
            ServerError::malformed("bad body").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::UnsupportedProtocol("websocket".into()).status(),
            StatusCode::BAD_REQUEST
        );
        let fault: ServerError = FaultError::malformed("id cannot be empty").into();
        assert_eq!(fault.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            fault.to_string(),
            "malformed failure description: id cannot be empty"
        );
    }

    #[test]
    fn test_server_errors_map_to_500() {
        assert_eq!(
            ServerError::sidecar("binding returned 503").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::startup("sidecar unreachable").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::proxy("status: Unavailable").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        let io: ServerError = std::io::Error::other("boom").into();
        assert_eq!(io.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ServerError::config("bad port").to_string(),
            "configuration error: bad port"
        );
        assert!(
            ServerError::sidecar("publish returned 500")
                .to_string()
                .contains("sidecar error")
        );
        assert_eq!(
            ServerError::proxy("deadline exceeded").to_string(),
            "failed to proxy request: deadline exceeded"
        );
    }
}
