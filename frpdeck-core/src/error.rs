//! Error types for frpdeck operations

/// Result type for frpdeck operations
pub type Result<T> = std::result::Result<T, DeckError>;

/// Error types for the reconciliation core
#[derive(Debug, thiserror::Error)]
pub enum DeckError {
    /// A download session for this version already exists
    #[error("Download already in flight: {0}")]
    AlreadyInFlight(String),

    /// Another activation is still waiting for confirmation
    #[error("Activation busy: '{pending}' is still pending")]
    Busy {
        /// Version the pending activation targets
        pending: String,
    },

    /// The agent is already running or starting
    #[error("frpc is already running")]
    AlreadyRunning,

    /// The agent is not running
    #[error("frpc is not running")]
    NotRunning,

    /// Version is not present in the catalog
    #[error("Unknown version: {0}")]
    UnknownVersion(String),

    /// The external backend call failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Event arrived on a topic the adapter does not know
    #[error("Unknown event topic: {0}")]
    UnknownTopic(String),

    /// Event payload could not be parsed at the boundary
    #[error("Invalid payload on '{topic}': {reason}")]
    InvalidPayload {
        /// Topic the payload was published on
        topic: String,
        /// Why parsing failed
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DeckError {
    /// Whether this error was a local rejection that never reached the backend
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            DeckError::AlreadyInFlight(_)
                | DeckError::Busy { .. }
                | DeckError::AlreadyRunning
                | DeckError::NotRunning
                | DeckError::UnknownVersion(_)
        )
    }

    /// Whether this error came from the external backend
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, DeckError::Backend(_))
    }
}

/// Failure of a Command Facade call.
///
/// The backend only ever reports a human-readable message, never a code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    /// Create a backend error from any message
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// The message reported by the backend
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl From<BackendError> for DeckError {
    fn from(err: BackendError) -> Self {
        DeckError::Backend(err.0)
    }
}

impl From<String> for DeckError {
    fn from(s: String) -> Self {
        DeckError::Other(s)
    }
}

impl From<&str> for DeckError {
    fn from(s: &str) -> Self {
        DeckError::Other(s.to_string())
    }
}

impl From<anyhow::Error> for DeckError {
    fn from(err: anyhow::Error) -> Self {
        DeckError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_request_classification() {
        assert!(DeckError::AlreadyInFlight("v1".into()).is_invalid_request());
        assert!(
            DeckError::Busy {
                pending: "v1".into()
            }
            .is_invalid_request()
        );
        assert!(DeckError::AlreadyRunning.is_invalid_request());
        assert!(!DeckError::Backend("boom".into()).is_invalid_request());
        assert!(DeckError::Backend("boom".into()).is_backend_failure());
    }

    #[test]
    fn test_backend_error_keeps_message() {
        let err: DeckError = BackendError::new("archive not found").into();
        assert_eq!(err.to_string(), "Backend error: archive not found");
    }
}
