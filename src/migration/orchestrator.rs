use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::batch::BatchWriter;
use super::blobs::{BlobSelection, BlobTask};
use super::collection::CollectionTask;
use super::progress::{BlobPhaseStatus, OverallStatus, ProgressTracker};
use super::types::{BlobMigrationResult, CollectionMigrationResult, JobFailure, JobResult, MigrationJobSpec};
use crate::catalog::CatalogService;
use crate::credentials::{CredentialsResolver, ResolvedCredentials};
use crate::docstore::{DocumentStoreClient, REFERENCE_BATCH_LIMIT};
use crate::error::{MigrationError, Result};
use crate::storage::BlobStoreClient;
use crate::transform::TransformRegistry;

/// Engine tuning knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub batch_limit: usize,
    pub write_concurrency: usize,
    pub blob_concurrency: usize,
    pub operation_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            batch_limit: REFERENCE_BATCH_LIMIT,
            write_concurrency: 4,
            blob_concurrency: 8,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

/// Validated job ready to run
#[derive(Debug, Clone)]
pub struct ValidatedJob {
    pub source: ResolvedCredentials,
    pub target: ResolvedCredentials,
}

/// Runs a migration job end to end
///
/// Collections are processed one after another in job or catalog order.
/// The blob phase runs afterwards when requested and no collection failed.
#[derive(Clone)]
pub struct MigrationOrchestrator {
    docs: Arc<dyn DocumentStoreClient>,
    blobs: Arc<dyn BlobStoreClient>,
    catalog: CatalogService,
    transforms: Arc<TransformRegistry>,
    resolver: Arc<CredentialsResolver>,
    settings: EngineSettings,
}

impl MigrationOrchestrator {
    pub fn new(
        docs: Arc<dyn DocumentStoreClient>,
        blobs: Arc<dyn BlobStoreClient>,
        transforms: Arc<TransformRegistry>,
        resolver: Arc<CredentialsResolver>,
        settings: EngineSettings,
    ) -> Self {
        let catalog = CatalogService::new(docs.clone(), blobs.clone(), settings.operation_timeout);
        Self {
            docs,
            blobs,
            catalog,
            transforms,
            resolver,
            settings,
        }
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn resolver(&self) -> &CredentialsResolver {
        &self.resolver
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Checks that need no backend access. Runs before any side effect.
    pub fn validate(&self, spec: &MigrationJobSpec) -> Result<ValidatedJob> {
        let source = self.resolver.resolve(spec.source_credentials.as_ref())?;
        let target = self.resolver.resolve_explicit(&spec.target_credentials)?;

        if source.project_id() == target.project_id() {
            return Err(MigrationError::InvalidJob(format!(
                "source and target are the same project '{}'",
                source.project_id()
            )));
        }

        if !spec.migrate_all_collections && effective_selection(&spec.selected_collections).is_empty() {
            return Err(MigrationError::InvalidJob(
                "no collections selected".to_string(),
            ));
        }

        if spec.include_blob_migration
            && !spec.migrate_all_blob_prefixes
            && effective_selection(&spec.selected_blob_prefixes).is_empty()
        {
            return Err(MigrationError::InvalidJob(
                "blob migration requested without any prefix selected".to_string(),
            ));
        }

        Ok(ValidatedJob { source, target })
    }

    /// Run a job to completion. Always yields a result, partial when the
    /// job failed or was cancelled.
    pub async fn run(
        &self,
        job_id: Uuid,
        spec: &MigrationJobSpec,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
    ) -> JobResult {
        self.run_and_publish(job_id, spec, progress, cancel, |_| {})
            .await
    }

    /// Same as [`run`](Self::run), handing the result to `publish` before the
    /// terminal status reaches progress subscribers. Anyone who observes a
    /// terminal status can therefore read the result.
    pub async fn run_and_publish<F>(
        &self,
        job_id: Uuid,
        spec: &MigrationJobSpec,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
        publish: F,
    ) -> JobResult
    where
        F: FnOnce(&JobResult),
    {
        let started_at = Utc::now();
        let mut collections = Vec::new();
        let mut blobs = None;

        let outcome = self
            .execute(spec, progress, cancel, &mut collections, &mut blobs)
            .await;

        let (status, failure) = match outcome {
            Ok(()) => (OverallStatus::Completed, None),
            Err(MigrationError::Cancelled) => {
                warn!(%job_id, "Migration cancelled");
                (
                    OverallStatus::Cancelled,
                    Some(JobFailure::from(&MigrationError::Cancelled)),
                )
            }
            Err(e) => {
                debug_assert!(e.is_fatal(), "non-fatal error ended job: {e}");
                error!(%job_id, error = %e, "Migration failed");
                progress.record_error(e.to_string());
                (OverallStatus::Failed, Some(JobFailure::from(&e)))
            }
        };

        if blobs.is_none() {
            let phase = progress.snapshot().blobs.phase_status;
            if phase == BlobPhaseStatus::Pending {
                progress.set_blob_phase(BlobPhaseStatus::Skipped);
            }
        }

        let result = JobResult {
            job_id,
            status,
            collections,
            blobs,
            failure,
            started_at,
            finished_at: Utc::now(),
        };
        publish(&result);
        progress.finish(status);

        let totals = result.totals();
        info!(
            %job_id,
            status = ?status,
            collections = result.collections.len(),
            migrated = totals.migrated,
            errors = result.error_count(),
            converted = totals.converted,
            "Migration finished"
        );
        result
    }

    async fn execute(
        &self,
        spec: &MigrationJobSpec,
        progress: &ProgressTracker,
        cancel: &CancellationToken,
        collections: &mut Vec<CollectionMigrationResult>,
        blobs: &mut Option<BlobMigrationResult>,
    ) -> Result<()> {
        let job = self.validate(spec)?;

        progress.set_status(OverallStatus::Enumerating);
        let names = if spec.migrate_all_collections {
            self.catalog.list_collections(&job.source).await?
        } else {
            effective_selection(&spec.selected_collections)
        };
        if names.is_empty() {
            return Err(MigrationError::InvalidJob(
                "source project has no collections to migrate".to_string(),
            ));
        }

        progress.begin_run(names.len());
        info!(
            source = job.source.project_id(),
            target = job.target.project_id(),
            collections = names.len(),
            "Migration started"
        );

        let writer = BatchWriter::new(
            self.docs.clone(),
            self.settings.batch_limit,
            self.settings.operation_timeout,
        );

        for name in &names {
            if cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }

            let transform = self.transforms.plan_for(name);
            let mut task = CollectionTask::new(
                name.as_str(),
                &job.source,
                &job.target,
                self.docs.as_ref(),
                &writer,
                transform,
                progress,
                cancel,
            )
            .with_write_concurrency(self.settings.write_concurrency)
            .with_operation_timeout(self.settings.operation_timeout);

            match task.run().await {
                Ok(result) => {
                    let stopped = result.skipped > 0;
                    collections.push(result);
                    progress.finish_collection();
                    if stopped {
                        return Err(MigrationError::Cancelled);
                    }
                }
                Err(e) => {
                    progress.abandon_collection();
                    return Err(e);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        if spec.include_blob_migration {
            let selection = if spec.migrate_all_blob_prefixes {
                BlobSelection::All
            } else {
                BlobSelection::Prefixes(effective_selection(&spec.selected_blob_prefixes))
            };

            let result = BlobTask::new(
                &job.source,
                &job.target,
                self.blobs.as_ref(),
                progress,
                cancel,
            )
            .with_concurrency(self.settings.blob_concurrency)
            .with_operation_timeout(self.settings.operation_timeout)
            .run(&selection)
            .await;

            let stopped = result.skipped > 0;
            *blobs = Some(result);
            if stopped || cancel.is_cancelled() {
                return Err(MigrationError::Cancelled);
            }
        } else {
            progress.set_blob_phase(BlobPhaseStatus::Skipped);
        }

        Ok(())
    }
}

/// Trimmed, non-empty, first-occurrence order
fn effective_selection(selected: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    selected
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(String::from)
        .collect()
}
