use std::sync::Arc;

use crate::config::Config;
use crate::jobs::JobService;
use crate::migration::MigrationOrchestrator;
use crate::observability::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub jobs: JobService,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: MigrationOrchestrator) -> Self {
        let metrics = Arc::new(Metrics::new());
        let jobs = JobService::new(Arc::new(orchestrator), metrics.clone())
            .with_retention(config.jobs.retention());
        Self {
            config: Arc::new(config),
            jobs,
            metrics,
        }
    }
}
