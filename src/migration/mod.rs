//! Migration engine
//!
//! ## Flow
//!
//! 1. [`MigrationOrchestrator::validate`] resolves credentials and checks the
//!    selection before anything touches a backend
//! 2. Collections are resolved (catalog when "migrate all" is set)
//! 3. Each collection runs as a [`CollectionTask`]: read everything, apply
//!    the collection's transform, write batches through [`BatchWriter`]
//! 4. The optional blob phase runs as a [`BlobTask`]
//!
//! Progress is published through a [`ProgressTracker`] after every I/O step.
//! A job is cancelled with a `CancellationToken`; cancellation is honoured
//! between collections and before each batch or blob copy is dispatched.

pub mod batch;
pub mod blobs;
pub mod collection;
pub mod orchestrator;
pub mod progress;
pub mod types;

pub use batch::{BatchWriteResult, BatchWriter};
pub use blobs::{BlobSelection, BlobTask};
pub use collection::{CollectionTask, CollectionTaskState};
pub use orchestrator::{EngineSettings, MigrationOrchestrator, ValidatedJob};
pub use progress::{BlobPhaseStatus, BlobProgress, OverallStatus, ProgressState, ProgressTracker};
pub use types::{
    BlobFailure, BlobMigrationResult, CollectionMigrationResult, JobFailure, JobResult, JobTotals,
    MigrationJobSpec, RecordFailure,
};
