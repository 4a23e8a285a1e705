use std::collections::BTreeMap;
use std::pin::pin;
use std::time::Duration;

use futures::future;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::{BlobPhaseStatus, ProgressTracker};
use super::types::{BlobFailure, BlobMigrationResult};
use crate::credentials::ResolvedCredentials;
use crate::storage::{BlobEntry, BlobStoreClient};

/// Which blobs to copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobSelection {
    /// Every blob in the source bucket
    All,
    /// Blobs under the given folder prefixes
    Prefixes(Vec<String>),
}

/// Copies blobs from source to target with bounded parallelism
pub struct BlobTask<'a> {
    source: &'a ResolvedCredentials,
    target: &'a ResolvedCredentials,
    client: &'a dyn BlobStoreClient,
    progress: &'a ProgressTracker,
    cancel: &'a CancellationToken,
    concurrency: usize,
    operation_timeout: Duration,
}

impl<'a> BlobTask<'a> {
    pub fn new(
        source: &'a ResolvedCredentials,
        target: &'a ResolvedCredentials,
        client: &'a dyn BlobStoreClient,
        progress: &'a ProgressTracker,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            source,
            target,
            client,
            progress,
            cancel,
            concurrency: 8,
            operation_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    pub async fn run(&self, selection: &BlobSelection) -> BlobMigrationResult {
        let mut result = BlobMigrationResult::default();

        self.progress.set_blob_phase(BlobPhaseStatus::Enumerating);
        let entries = self.enumerate(selection, &mut result).await;
        result.total_files = entries.len() as u64;
        self.progress.add_blob_files(result.total_files);
        info!(total = result.total_files, "Blobs enumerated");

        self.progress.set_blob_phase(BlobPhaseStatus::Copying);
        self.copy_all(entries, &mut result).await;

        result.skipped = result
            .total_files
            .saturating_sub(result.migrated + result.errors);
        self.progress.set_blob_phase(BlobPhaseStatus::Done);

        info!(
            migrated = result.migrated,
            errors = result.errors,
            skipped = result.skipped,
            bytes = result.bytes_copied,
            "Blob migration finished"
        );
        result
    }

    /// Listing is deduplicated by path, so overlapping prefixes copy once
    async fn enumerate(
        &self,
        selection: &BlobSelection,
        result: &mut BlobMigrationResult,
    ) -> Vec<BlobEntry> {
        let prefixes: Vec<&str> = match selection {
            BlobSelection::All => vec![""],
            BlobSelection::Prefixes(prefixes) => prefixes.iter().map(String::as_str).collect(),
        };

        let mut unique = BTreeMap::new();
        for prefix in prefixes {
            let listing = timeout(self.operation_timeout, self.client.list_blobs(self.source, prefix));
            let message = match listing.await {
                Ok(Ok(entries)) => {
                    debug!(prefix, count = entries.len(), "Listed blobs");
                    for entry in entries {
                        unique.entry(entry.path).or_insert(entry.size);
                    }
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("listing timed out after {:?}", self.operation_timeout),
            };

            warn!(prefix, error = %message, "Blob listing failed");
            self.progress
                .record_error(format!("failed to list blobs under '{prefix}': {message}"));
            result
                .failed_prefixes
                .push(BlobFailure::transfer_error(prefix, message));
        }

        unique
            .into_iter()
            .map(|(path, size)| BlobEntry { path, size })
            .collect()
    }

    async fn copy_all(&self, entries: Vec<BlobEntry>, result: &mut BlobMigrationResult) {
        let cancel = self.cancel;
        let progress = self.progress;

        let copies = stream::iter(entries)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|entry| {
                progress.start_blob(&entry.path);
                async move {
                    let outcome = self.copy_one(&entry.path).await;
                    (entry.path, outcome)
                }
            })
            .buffer_unordered(self.concurrency);
        let mut copies = pin!(copies);

        while let Some((path, outcome)) = copies.next().await {
            match outcome {
                Ok(bytes) => {
                    result.migrated += 1;
                    result.bytes_copied += bytes;
                }
                Err(message) => {
                    warn!(path = %path, error = %message, "Blob copy failed");
                    progress.record_error(format!("failed to copy '{path}': {message}"));
                    result.errors += 1;
                    result.failures.push(BlobFailure::transfer_error(path, message));
                }
            }
            progress.finish_blob();
        }
    }

    /// Stream one blob to the same path on the target
    async fn copy_one(&self, path: &str) -> std::result::Result<u64, String> {
        let copy = async {
            let read = self
                .client
                .read_blob(self.source, path)
                .await
                .map_err(|e| format!("read failed: {e}"))?;

            self.client
                .write_blob(self.target, path, read.stream, read.content_type, read.metadata)
                .await
                .map_err(|e| format!("write failed: {e}"))
        };

        match timeout(self.operation_timeout, copy).await {
            Ok(outcome) => {
                if let Ok(bytes) = &outcome {
                    debug!(path, bytes, "Blob copied");
                }
                outcome
            }
            Err(_) => Err(format!("copy timed out after {:?}", self.operation_timeout)),
        }
    }
}
