use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use shiftbox::api::{self, models::JobRequest};
use shiftbox::config::Config;
use shiftbox::jobs::JobService;
use shiftbox::migration::{JobResult, OverallStatus};
use shiftbox::observability::Metrics;

use crate::cli::{MigrateArgs, ServerArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn serve(config: Config, args: ServerArgs) -> Result<(), AnyError> {
    api::run(config, args.address).await
}

/// Run one job from a TOML description and print its result as JSON.
/// Fails when the job does not complete.
pub async fn migrate(config: Config, args: MigrateArgs) -> Result<(), AnyError> {
    let request = read_job_file(&args.job)?;
    api::validate_job_request(&request)?;
    let spec = api::into_job_spec(request, &config.credentials)?;

    let orchestrator = config
        .orchestrator()
        .map_err(|e| format!("Failed to open document store: {}", e))?;
    let jobs = JobService::new(Arc::new(orchestrator), Arc::new(Metrics::new()));

    let job_id = jobs.start_job(spec)?;
    info!(%job_id, job_file = %args.job.display(), "Migration job started");

    let mut progress = jobs.subscribe(job_id)?;
    let reporter = tokio::spawn(async move {
        let mut last_collection = None;
        while progress.changed().await.is_ok() {
            let state = progress.borrow_and_update().clone();
            if state.current_collection != last_collection {
                if let Some(collection) = &state.current_collection {
                    info!(
                        collection,
                        processed_collections = state.processed_collections,
                        total_collections = state.total_collections,
                        "Migrating collection"
                    );
                }
                last_collection = state.current_collection;
            }
            if state.overall_status.is_terminal() {
                break;
            }
        }
    });

    let result = tokio::select! {
        result = jobs.wait(job_id) => result?,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(%job_id, "Interrupted, cancelling job");
            jobs.cancel(job_id).ok();
            jobs.wait(job_id).await?
        }
    };
    reporter.abort();

    print_result(&result, args.compact)?;

    if result.status != OverallStatus::Completed {
        return Err(format!("job {} finished with status {:?}", job_id, result.status).into());
    }

    Ok(())
}

fn read_job_file(path: &Path) -> Result<JobRequest, AnyError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read job file {}: {}", path.display(), e))?;
    let request = toml::from_str(&raw)
        .map_err(|e| format!("Invalid job file {}: {}", path.display(), e))?;
    Ok(request)
}

fn print_result(result: &JobResult, compact: bool) -> Result<(), AnyError> {
    let json = if compact {
        serde_json::to_string(result)?
    } else {
        serde_json::to_string_pretty(result)?
    };
    println!("{json}");
    Ok(())
}
