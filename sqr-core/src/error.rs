use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("parent not yet synced: {0}")]
    ParentNotSynced(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("row already exists: {0}")]
    AlreadyExists(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IO_ERROR",
            Error::Unavailable(_) => "UNAVAILABLE",
            Error::ParentNotSynced(_) => "PARENT_NOT_SYNCED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::InvalidDocument(_) => "INVALID_DOCUMENT",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::AlreadyExists(_) => "ALREADY_EXISTS",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a retry of the same operation can reasonably succeed.
    ///
    /// Dependency and translation errors are excluded: a missing parent row
    /// or a malformed document will not heal within a retry window, only a
    /// later reconciliation pass can fix them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_) | Error::Unavailable(_))
    }
}
