use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialsError;

/// Migration engine errors
///
/// The first four variants and `Cancelled` end a job. `RecordWriteError` and
/// `BlobTransferError` are accumulated into result counters and never stop
/// sibling work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MigrationError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(#[from] CredentialsError),

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("failed to read collection '{collection}': {message}")]
    CollectionReadFailure { collection: String, message: String },

    #[error("failed to write record '{id}' in '{collection}': {message}")]
    RecordWriteError {
        collection: String,
        id: String,
        message: String,
    },

    #[error("failed to transfer blob '{path}': {message}")]
    BlobTransferError { path: String, message: String },

    #[error("job cancelled")]
    Cancelled,
}

/// Stable error classification surfaced in job results and API payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCredentials,
    InvalidJob,
    CatalogUnavailable,
    CollectionReadFailure,
    RecordWriteError,
    BlobTransferError,
    Cancelled,
}

impl MigrationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MigrationError::InvalidCredentials(_) => ErrorKind::InvalidCredentials,
            MigrationError::InvalidJob(_) => ErrorKind::InvalidJob,
            MigrationError::CatalogUnavailable(_) => ErrorKind::CatalogUnavailable,
            MigrationError::CollectionReadFailure { .. } => ErrorKind::CollectionReadFailure,
            MigrationError::RecordWriteError { .. } => ErrorKind::RecordWriteError,
            MigrationError::BlobTransferError { .. } => ErrorKind::BlobTransferError,
            MigrationError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether this error terminates the job
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            MigrationError::RecordWriteError { .. } | MigrationError::BlobTransferError { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(MigrationError::InvalidJob("x".into()).is_fatal());
        assert!(MigrationError::Cancelled.is_fatal());
        assert!(
            !MigrationError::BlobTransferError {
                path: "a".into(),
                message: "b".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let kind = MigrationError::CollectionReadFailure {
            collection: "orders".into(),
            message: "boom".into(),
        }
        .kind();
        assert_eq!(
            serde_json::to_string(&kind).unwrap(),
            "\"collection_read_failure\""
        );
    }
}
