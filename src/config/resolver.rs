//! Turns validated configuration into engine components

use super::models::{BlobProvider, Config};
use crate::credentials::CredentialsResolver;
use crate::docstore::{self, FjallDocumentStore};
use crate::migration::{EngineSettings, MigrationOrchestrator};
use crate::storage::{BucketLocation, ObjectStoreBlobClient};
use crate::transform::TransformRegistry;
use std::sync::Arc;
use std::time::Duration;

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            batch_limit: self.engine.batch_limit,
            write_concurrency: self.engine.write_concurrency,
            blob_concurrency: self.engine.blob_concurrency,
            operation_timeout: Duration::from_secs(self.engine.operation_timeout_secs),
        }
    }

    /// Collection -> transform mapping, resolved once at startup
    pub fn transform_registry(&self) -> TransformRegistry {
        self.transforms
            .iter()
            .map(|(collection, transform)| (collection.clone(), transform.clone()))
            .collect()
    }

    /// Resolver reading the ambient project from the configured variables
    pub fn credentials_resolver(&self) -> CredentialsResolver {
        CredentialsResolver::from_env(self.credentials.ambient_project_vars.as_slice())
    }

    pub fn blob_client(&self) -> ObjectStoreBlobClient {
        let location = match self.backend.blob_provider {
            BlobProvider::Memory => BucketLocation::Memory,
            BlobProvider::Local => BucketLocation::Local(self.backend.blob_dir.clone()),
        };
        ObjectStoreBlobClient::new(location, self.engine.part_size.as_usize())
    }

    /// Orchestrator over the Fjall document store under `backend.data_dir`
    pub fn orchestrator(&self) -> docstore::Result<MigrationOrchestrator> {
        let docs = FjallDocumentStore::open(&self.backend.data_dir)?;

        Ok(MigrationOrchestrator::new(
            Arc::new(docs),
            Arc::new(self.blob_client()),
            Arc::new(self.transform_registry()),
            Arc::new(self.credentials_resolver()),
            self.engine_settings(),
        ))
    }
}
