use crate::deletion::DeletionError;
use thiserror::Error;
use tinylink_core::{ShortId, StorageError};

#[derive(Debug, Clone, Error)]
pub enum ShortenerError {
    /// The URL was already shortened; carries the existing identifier.
    #[error("url already shortened as {0}")]
    Conflict(ShortId),
    #[error("short url not found: {0}")]
    NotFound(ShortId),
    #[error("short url has been deleted: {0}")]
    Gone(ShortId),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Deletion(#[from] DeletionError),
    #[error("storage error: {0}")]
    Storage(#[source] StorageError),
}

impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::Conflict(id) => Self::Conflict(ShortId::new(id)),
            StorageError::NotFound(id) => Self::NotFound(ShortId::new(id)),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_conflict_keeps_identifier() {
        let err = ShortenerError::from(StorageError::Conflict("2187b119".to_string()));
        assert!(matches!(err, ShortenerError::Conflict(id) if id.as_str() == "2187b119"));
    }

    #[test]
    fn other_storage_errors_are_wrapped() {
        let err = ShortenerError::from(StorageError::Timeout("pool".to_string()));
        assert!(matches!(err, ShortenerError::Storage(StorageError::Timeout(_))));
    }
}
