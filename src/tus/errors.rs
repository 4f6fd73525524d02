use thiserror::Error;
use crate::core::UploadError;

#[derive(Error, Debug)]
pub enum TusError {
    #[error("HTTP Request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("Upload incomplete expected: {expected}, actual: {actual}")]
    UploadIncomplete {
        expected: u64,
        actual: u64,
    },

    #[error("Invalid '{header_name}' header: {message}")]
    HeaderParseError {
        header_name: String,
        message: String,
    },

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TusError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn header_error(header_name: &str, message: impl ToString) -> Self {
        Self::HeaderParseError {
            header_name: header_name.to_string(),
            message: message.to_string(),
        }
    }
}

/// Backend failures reach the caller verbatim as transfer errors.
impl From<TusError> for UploadError {
    fn from(err: TusError) -> Self {
        UploadError::Transfer(err.to_string())
    }
}

/// Error alias
pub type Result<T, E = TusError> = std::result::Result<T, E>;
