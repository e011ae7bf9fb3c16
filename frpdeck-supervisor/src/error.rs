//! Error types for supervisor operations

use frpdeck_core::error::{BackendError, DeckError};
use thiserror::Error;

/// Result type for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Error types for supervisor
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error("Failed to spawn frpc: {0}")]
    Spawn(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SupervisorError {
    /// Whether this was a local rejection (e.g. already running)
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, SupervisorError::Deck(e) if e.is_invalid_request())
    }
}

impl From<BackendError> for SupervisorError {
    fn from(err: BackendError) -> Self {
        SupervisorError::Deck(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deck_errors_pass_through() {
        let err: SupervisorError = DeckError::AlreadyRunning.into();
        assert!(err.is_invalid_request());
        assert_eq!(err.to_string(), "frpc is already running");
    }

    #[test]
    fn test_backend_rejection_is_not_invalid_request() {
        let err: SupervisorError = BackendError::new("frpc: No such file or directory").into();
        assert!(matches!(&err, SupervisorError::Deck(e) if e.is_backend_failure()));
        assert!(!err.is_invalid_request());
    }
}
