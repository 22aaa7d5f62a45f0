//! Error types for faultline-core.
//!
//! Per Iron Lotus Framework: All errors are explicit, no panics allowed.

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, FaultError>;

/// Errors raised while interpreting a failure description.
///
/// The tracker and the decision engine themselves cannot fail; the only
/// failure mode is input that never becomes a valid description.
#[derive(Debug, thiserror::Error)]
pub enum FaultError {
    /// Payload could not be turned into a failure description.
    #[error("malformed failure description: {0}")]
    Malformed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FaultError {
    /// Creates a malformed-input error.
    #[must_use]
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Returns true if the error was caused by the caller's payload.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}
