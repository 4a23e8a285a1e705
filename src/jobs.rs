//! In-memory job registry
//!
//! Jobs are validated synchronously, then spawned on the tokio runtime.
//! Progress, results and cancellation handles live only in process memory;
//! nothing (credentials included) is written to disk. Finished jobs are
//! dropped once their result is older than the retention window.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::MigrationError;
use crate::migration::{
    JobResult, MigrationJobSpec, MigrationOrchestrator, OverallStatus, ProgressState,
    ProgressTracker,
};
use crate::observability::Metrics;

#[derive(Debug, Error)]
pub enum JobServiceError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} has not finished yet")]
    NotFinished(Uuid),

    #[error("job {0} has already finished")]
    AlreadyFinished(Uuid),

    #[error(transparent)]
    Rejected(#[from] MigrationError),
}

/// Listing entry for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub source_project: String,
    pub target_project: String,
    pub status: OverallStatus,
    pub created_at: DateTime<Utc>,
}

struct JobEntry {
    source_project: String,
    target_project: String,
    created_at: DateTime<Utc>,
    progress: ProgressTracker,
    cancel: CancellationToken,
    result: watch::Sender<Option<JobResult>>,
}

impl JobEntry {
    fn summary(&self, job_id: Uuid) -> JobSummary {
        JobSummary {
            job_id,
            source_project: self.source_project.clone(),
            target_project: self.target_project.clone(),
            status: self.progress.snapshot().overall_status,
            created_at: self.created_at,
        }
    }

    fn finished_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.result
            .borrow()
            .as_ref()
            .is_some_and(|result| result.finished_at < cutoff)
    }
}

/// Default time a finished job stays queryable
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone)]
pub struct JobService {
    orchestrator: Arc<MigrationOrchestrator>,
    jobs: Arc<RwLock<HashMap<Uuid, Arc<JobEntry>>>>,
    metrics: Arc<Metrics>,
    retention: Duration,
}

impl JobService {
    pub fn new(orchestrator: Arc<MigrationOrchestrator>, metrics: Arc<Metrics>) -> Self {
        Self {
            orchestrator,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            metrics,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn orchestrator(&self) -> &MigrationOrchestrator {
        &self.orchestrator
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Validate and spawn a job. Invalid jobs are rejected here and never
    /// reach a backend.
    pub fn start_job(&self, spec: MigrationJobSpec) -> Result<Uuid, JobServiceError> {
        let validated = self.orchestrator.validate(&spec)?;
        self.prune_finished();

        let job_id = Uuid::now_v7();
        let (result_tx, _) = watch::channel(None);
        let entry = Arc::new(JobEntry {
            source_project: validated.source.project_id().to_string(),
            target_project: validated.target.project_id().to_string(),
            created_at: Utc::now(),
            progress: ProgressTracker::new(),
            cancel: CancellationToken::new(),
            result: result_tx,
        });

        self.jobs_mut().insert(job_id, entry.clone());
        self.metrics.job_started();
        info!(
            %job_id,
            source = %entry.source_project,
            target = %entry.target_project,
            "Job accepted"
        );

        let orchestrator = self.orchestrator.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            orchestrator
                .run_and_publish(job_id, &spec, &entry.progress, &entry.cancel, |result| {
                    metrics.job_finished(result);
                    entry.result.send_replace(Some(result.clone()));
                })
                .await;
        });

        Ok(job_id)
    }

    pub fn get_progress(&self, job_id: Uuid) -> Result<ProgressState, JobServiceError> {
        Ok(self.entry(job_id)?.progress.snapshot())
    }

    /// Push-style progress updates
    pub fn subscribe(
        &self,
        job_id: Uuid,
    ) -> Result<watch::Receiver<ProgressState>, JobServiceError> {
        Ok(self.entry(job_id)?.progress.subscribe())
    }

    /// Final result, available once the job is terminal
    pub fn get_result(&self, job_id: Uuid) -> Result<JobResult, JobServiceError> {
        self.entry(job_id)?
            .result
            .borrow()
            .clone()
            .ok_or(JobServiceError::NotFinished(job_id))
    }

    /// Wait for the job to finish and return its result
    pub async fn wait(&self, job_id: Uuid) -> Result<JobResult, JobServiceError> {
        let mut rx = self.entry(job_id)?.result.subscribe();
        let result = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| JobServiceError::NotFinished(job_id))?;

        result.clone().ok_or(JobServiceError::NotFinished(job_id))
    }

    /// Request cancellation. In-flight batches finish; nothing new starts.
    pub fn cancel(&self, job_id: Uuid) -> Result<(), JobServiceError> {
        let entry = self.entry(job_id)?;
        if entry.result.borrow().is_some() {
            return Err(JobServiceError::AlreadyFinished(job_id));
        }

        warn!(%job_id, "Cancellation requested");
        entry.cancel.cancel();
        Ok(())
    }

    pub fn summary(&self, job_id: Uuid) -> Result<JobSummary, JobServiceError> {
        Ok(self.entry(job_id)?.summary(job_id))
    }

    /// Cancel every job that has not finished. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut cancelled = 0;
        for (job_id, entry) in jobs.iter() {
            if entry.result.borrow().is_none() && !entry.cancel.is_cancelled() {
                warn!(%job_id, "Cancelling job on shutdown");
                entry.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Drop finished jobs whose result is older than the retention window.
    /// Running jobs are always kept. Returns how many were dropped.
    pub fn prune_finished(&self) -> usize {
        let cutoff = TimeDelta::from_std(self.retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));

        match cutoff {
            Some(cutoff) => self.prune_finished_before(cutoff),
            None => 0,
        }
    }

    fn prune_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut jobs = self.jobs_mut();
        let before = jobs.len();
        jobs.retain(|job_id, entry| {
            let expired = entry.finished_before(cutoff);
            if expired {
                debug!(%job_id, "Dropping expired job");
            }
            !expired
        });

        let pruned = before - jobs.len();
        if pruned > 0 {
            info!(pruned, remaining = jobs.len(), "Pruned finished jobs");
        }
        pruned
    }

    /// All known jobs, oldest first
    pub fn list_jobs(&self) -> Vec<JobSummary> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        let mut summaries: Vec<_> = jobs
            .iter()
            .map(|(job_id, entry)| entry.summary(*job_id))
            .collect();
        summaries.sort_by_key(|s| s.job_id);
        summaries
    }

    fn entry(&self, job_id: Uuid) -> Result<Arc<JobEntry>, JobServiceError> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
            .ok_or(JobServiceError::NotFound(job_id))
    }

    fn jobs_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, Arc<JobEntry>>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}
