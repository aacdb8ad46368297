use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    AuthRequired,
    StorageUnavailable,
    ImageDecode,
    Unknown,
}

/// Operation-boundary error for everything the wall can do.
///
/// The display text is the user-facing message; raw provider errors are
/// logged as structured detail and never reach the UI text.
#[derive(Debug, Clone, Error)]
pub enum GridError {
    #[error("Sign in to modify the wall")]
    AuthRequired,
    #[error("Image storage is unavailable; try again")]
    StorageUnavailable(String),
    #[error("That file could not be read as an image")]
    ImageDecode(String),
    #[error("Something went wrong; see the debug log")]
    Unknown(String),
}

impl GridError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GridError::AuthRequired => ErrorCode::AuthRequired,
            GridError::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            GridError::ImageDecode(_) => ErrorCode::ImageDecode,
            GridError::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// Raw cause for the log sink; empty for AuthRequired, which carries none.
    pub fn detail(&self) -> &str {
        match self {
            GridError::AuthRequired => "",
            GridError::StorageUnavailable(detail)
            | GridError::ImageDecode(detail)
            | GridError::Unknown(detail) => detail,
        }
    }

    pub fn unknown(err: impl std::fmt::Display) -> Self {
        GridError::Unknown(err.to_string())
    }
}
