//! Document store clients
//!
//! The migration engine talks to document databases only through
//! [`DocumentStoreClient`]. Two backends ship with the crate:
//!
//! - [`FjallDocumentStore`] - one embedded Fjall keyspace per project under a
//!   data directory, used by the server and CLI
//! - [`MemoryDocumentStore`] - in-process store with fault injection, used by
//!   tests
//!
//! ## Write semantics
//!
//! `upsert_batch` is an upsert keyed by record id with field-level merge:
//! incoming fields overwrite, fields the incoming record does not carry are
//! left on the stored document. Failures are reported per record.

pub mod error;
pub mod fjall_store;
pub mod keys;
pub mod memory;

pub use error::{DocumentStoreError, Result};
pub use fjall_store::FjallDocumentStore;
pub use memory::MemoryDocumentStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credentials::ResolvedCredentials;
use crate::record::Record;

/// Hard per-batch item limit of the reference backend
pub const REFERENCE_BATCH_LIMIT: usize = 500;

/// Per-record outcome of a batch upsert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    pub id: String,
    pub error: Option<String>,
}

impl WriteOutcome {
    pub fn ok(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: None,
        }
    }

    pub fn failed(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[async_trait]
pub trait DocumentStoreClient: Send + Sync {
    /// Enumerate collection names in backend order
    async fn list_collection_names(&self, creds: &ResolvedCredentials) -> Result<Vec<String>>;

    /// Read every record of a collection into memory
    async fn read_all_records(
        &self,
        creds: &ResolvedCredentials,
        collection: &str,
    ) -> Result<Vec<Record>>;

    /// Upsert a batch of at most [`max_batch_size`](Self::max_batch_size) records
    async fn upsert_batch(
        &self,
        creds: &ResolvedCredentials,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<WriteOutcome>>;

    fn max_batch_size(&self) -> usize {
        REFERENCE_BATCH_LIMIT
    }
}

/// Project ids become directory names for on-disk backends
pub(crate) fn validate_project_id(project_id: &str) -> Result<()> {
    let valid = !project_id.is_empty()
        && project_id != "."
        && project_id != ".."
        && project_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        Err(DocumentStoreError::InvalidProject(project_id.to_string()))
    }
}
