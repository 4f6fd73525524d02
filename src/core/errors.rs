use thiserror::Error;
use super::types::UploadState;

/// Local checks that reject a file before any network activity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File is too large: {size} bytes exceeds the {max_mb} MB limit")]
    TooLarge {
        size: u64,
        max_mb: u64,
    },

    #[error("File type '{content_type}' of {file_name} is not accepted (allowed: {filter})")]
    TypeNotAccepted {
        file_name: String,
        content_type: String,
        filter: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Backend failure, message kept verbatim.
    #[error("Transfer error: {0}")]
    Transfer(String),

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: UploadState,
    },

    #[error("Manager shutdown")]
    ManagerShutdown,
}

impl UploadError {
    pub fn transfer(message: impl Into<String>) -> Self {
        Self::Transfer(message.into())
    }

    pub(crate) fn invalid(action: &'static str, state: UploadState) -> Self {
        Self::InvalidTransition { action, state }
    }

    /// Validation failures only go away with a different file.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Transfer(_))
    }
}

pub type Result<T, E = UploadError> = std::result::Result<T, E>;
