use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::progress::OverallStatus;
use crate::credentials::Credentials;
use crate::error::{ErrorKind, MigrationError};

/// What to migrate and between which projects
///
/// With `migrate_all_collections` set, `selected_collections` is ignored and
/// the source catalog is consulted when the job runs. Blob prefixes follow
/// the same rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
pub struct MigrationJobSpec {
    /// Absent means ambient credentials for the source
    #[serde(default)]
    pub source_credentials: Option<Credentials>,
    pub target_credentials: Credentials,
    #[serde(default)]
    #[builder(default)]
    pub selected_collections: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    pub migrate_all_collections: bool,
    #[serde(default)]
    #[builder(default)]
    pub selected_blob_prefixes: Vec<String>,
    #[serde(default)]
    #[builder(default)]
    pub migrate_all_blob_prefixes: bool,
    #[serde(default)]
    #[builder(default)]
    pub include_blob_migration: bool,
}

/// A record the target rejected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub id: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordFailure {
    /// Non-fatal write failure of one record
    pub fn write_error(collection: &str, id: impl Into<String>, cause: impl Into<String>) -> Self {
        let id = id.into();
        let error = MigrationError::RecordWriteError {
            collection: collection.to_string(),
            id: id.clone(),
            message: cause.into(),
        };
        Self {
            id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one collection
///
/// `migrated + errors + skipped == total_documents`. `skipped` is non-zero
/// only when cancellation stopped the collection before every batch was
/// dispatched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMigrationResult {
    pub collection_name: String,
    pub total_documents: u64,
    pub migrated: u64,
    pub errors: u64,
    pub converted_records: u64,
    pub skipped: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_errors: Vec<RecordFailure>,
}

impl CollectionMigrationResult {
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            ..Default::default()
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.migrated + self.errors + self.skipped == self.total_documents
    }
}

/// A blob copy or prefix listing that failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobFailure {
    pub path: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl BlobFailure {
    pub fn transfer_error(path: impl Into<String>, cause: impl Into<String>) -> Self {
        let path = path.into();
        let error = MigrationError::BlobTransferError {
            path: path.clone(),
            message: cause.into(),
        };
        Self {
            path,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// Outcome of the blob phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMigrationResult {
    pub total_files: u64,
    pub migrated: u64,
    pub errors: u64,
    pub skipped: u64,
    pub bytes_copied: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<BlobFailure>,
    /// Prefixes whose listing failed; their blobs are not in `total_files`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_prefixes: Vec<BlobFailure>,
}

/// Fatal error that ended a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&MigrationError> for JobFailure {
    fn from(err: &MigrationError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Final (or partial) summary of a job run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub status: OverallStatus,
    pub collections: Vec<CollectionMigrationResult>,
    pub blobs: Option<BlobMigrationResult>,
    pub failure: Option<JobFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Totals summed over every collection of a job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTotals {
    pub documents: u64,
    pub migrated: u64,
    pub errors: u64,
    pub converted: u64,
    pub skipped: u64,
}

impl JobResult {
    pub fn totals(&self) -> JobTotals {
        self.collections
            .iter()
            .fold(JobTotals::default(), |mut totals, result| {
                totals.documents += result.total_documents;
                totals.migrated += result.migrated;
                totals.errors += result.errors;
                totals.converted += result.converted_records;
                totals.skipped += result.skipped;
                totals
            })
    }

    /// Record and blob errors, independent of `status`
    pub fn error_count(&self) -> u64 {
        let blob_errors = self
            .blobs
            .as_ref()
            .map(|b| b.errors + b.failed_prefixes.len() as u64)
            .unwrap_or(0);
        self.totals().errors + blob_errors
    }
}
