//! Source-side enumeration of collections and blob prefixes

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::credentials::ResolvedCredentials;
use crate::docstore::DocumentStoreClient;
use crate::error::{MigrationError, Result};
use crate::storage::BlobStoreClient;

/// Lists what a project holds. One backend call per listing, no retry.
#[derive(Clone)]
pub struct CatalogService {
    docs: Arc<dyn DocumentStoreClient>,
    blobs: Arc<dyn BlobStoreClient>,
    operation_timeout: Duration,
}

impl CatalogService {
    pub fn new(
        docs: Arc<dyn DocumentStoreClient>,
        blobs: Arc<dyn BlobStoreClient>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            docs,
            blobs,
            operation_timeout,
        }
    }

    /// Collection names in backend order
    pub async fn list_collections(&self, creds: &ResolvedCredentials) -> Result<Vec<String>> {
        let names = match timeout(self.operation_timeout, self.docs.list_collection_names(creds)).await {
            Ok(Ok(names)) => names,
            Ok(Err(e)) => {
                warn!(project_id = creds.project_id(), error = %e, "Collection listing failed");
                return Err(MigrationError::CatalogUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(project_id = creds.project_id(), "Collection listing timed out");
                return Err(MigrationError::CatalogUnavailable(format!(
                    "collection listing timed out after {:?}",
                    self.operation_timeout
                )));
            }
        };

        debug!(project_id = creds.project_id(), count = names.len(), "Listed collections");
        Ok(names)
    }

    /// Top-level blob folder prefixes in backend order
    pub async fn list_blob_prefixes(&self, creds: &ResolvedCredentials) -> Result<Vec<String>> {
        let prefixes = match timeout(self.operation_timeout, self.blobs.list_prefixes(creds)).await {
            Ok(Ok(prefixes)) => prefixes,
            Ok(Err(e)) => {
                warn!(project_id = creds.project_id(), error = %e, "Prefix listing failed");
                return Err(MigrationError::CatalogUnavailable(e.to_string()));
            }
            Err(_) => {
                warn!(project_id = creds.project_id(), "Prefix listing timed out");
                return Err(MigrationError::CatalogUnavailable(format!(
                    "prefix listing timed out after {:?}",
                    self.operation_timeout
                )));
            }
        };

        debug!(project_id = creds.project_id(), count = prefixes.len(), "Listed blob prefixes");
        Ok(prefixes)
    }
}
