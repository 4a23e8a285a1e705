//! Per-job progress shared between the engine and observers

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    #[default]
    Idle,
    Enumerating,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OverallStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobPhaseStatus {
    #[default]
    Pending,
    Enumerating,
    Copying,
    Done,
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobProgress {
    pub total_files: u64,
    pub processed_files: u64,
    pub current_file: Option<String>,
    pub phase_status: BlobPhaseStatus,
}

/// Snapshot of a job's progress
///
/// Counters only grow during a run. Document counters accumulate across
/// collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub total_collections: usize,
    pub processed_collections: usize,
    pub current_collection: Option<String>,
    pub total_documents: u64,
    pub processed_documents: u64,
    pub current_document: Option<String>,
    pub blobs: BlobProgress,
    pub overall_status: OverallStatus,
    pub last_error: Option<String>,
}

/// Writer side of a job's progress, backed by a watch channel
///
/// Clones share the same state. Updates are applied with `send_modify`, so
/// they land even when nobody is subscribed.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    tx: Arc<watch::Sender<ProgressState>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn snapshot(&self) -> ProgressState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.tx.subscribe()
    }

    pub fn set_status(&self, status: OverallStatus) {
        self.tx.send_modify(|state| state.overall_status = status);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|state| state.last_error = Some(message));
    }

    /// Collection set is known; the run starts
    pub fn begin_run(&self, total_collections: usize) {
        self.tx.send_modify(|state| {
            state.total_collections = state.total_collections.max(total_collections);
            state.overall_status = OverallStatus::Running;
        });
    }

    pub fn start_collection(&self, name: &str) {
        let name = name.to_string();
        self.tx.send_modify(|state| {
            state.current_collection = Some(name);
            state.current_document = None;
        });
    }

    /// Collection has been read; `documents` of them will be processed
    pub fn add_documents(&self, documents: u64) {
        self.tx
            .send_modify(|state| state.total_documents = state.total_documents.saturating_add(documents));
    }

    pub fn set_current_document(&self, id: &str) {
        let id = id.to_string();
        self.tx.send_modify(|state| state.current_document = Some(id));
    }

    /// No batch is in flight
    pub fn clear_current_document(&self) {
        self.tx.send_modify(|state| state.current_document = None);
    }

    pub fn documents_processed(&self, count: u64) {
        self.tx.send_modify(|state| {
            state.processed_documents = state.processed_documents.saturating_add(count);
        });
    }

    pub fn finish_collection(&self) {
        self.tx.send_modify(|state| {
            state.processed_collections += 1;
            state.current_collection = None;
            state.current_document = None;
        });
    }

    /// Leave the collection phase without counting the current collection
    pub fn abandon_collection(&self) {
        self.tx.send_modify(|state| {
            state.current_collection = None;
            state.current_document = None;
        });
    }

    pub fn set_blob_phase(&self, phase: BlobPhaseStatus) {
        self.tx.send_modify(|state| {
            state.blobs.phase_status = phase;
            if matches!(phase, BlobPhaseStatus::Done | BlobPhaseStatus::Skipped) {
                state.blobs.current_file = None;
            }
        });
    }

    pub fn add_blob_files(&self, files: u64) {
        self.tx.send_modify(|state| {
            state.blobs.total_files = state.blobs.total_files.saturating_add(files);
        });
    }

    pub fn start_blob(&self, path: &str) {
        let path = path.to_string();
        self.tx.send_modify(|state| state.blobs.current_file = Some(path));
    }

    pub fn finish_blob(&self) {
        self.tx.send_modify(|state| {
            state.blobs.processed_files = state.blobs.processed_files.saturating_add(1);
        });
    }

    /// Terminal transition; clears every `current_*` field
    pub fn finish(&self, status: OverallStatus) {
        self.tx.send_modify(|state| {
            state.overall_status = status;
            state.current_collection = None;
            state.current_document = None;
            state.blobs.current_file = None;
        });
    }
}
