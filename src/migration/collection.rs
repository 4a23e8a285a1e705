use std::pin::pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future;
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::batch::BatchWriter;
use super::progress::ProgressTracker;
use super::types::CollectionMigrationResult;
use crate::credentials::ResolvedCredentials;
use crate::docstore::DocumentStoreClient;
use crate::error::{MigrationError, Result};
use crate::record::Record;
use crate::transform::{RecordTransform, TransformOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionTaskState {
    Pending,
    Reading,
    Transforming,
    Writing,
    Done,
    Failed,
}

/// Batch ready for dispatch
struct PreparedBatch {
    records: Vec<Record>,
    converted: u64,
}

/// Migrates one collection: read, transform, batch-write
///
/// The whole collection is held in memory between the read and the writes.
pub struct CollectionTask<'a> {
    name: String,
    source: &'a ResolvedCredentials,
    target: &'a ResolvedCredentials,
    reader: &'a dyn DocumentStoreClient,
    writer: &'a BatchWriter,
    transform: RecordTransform,
    progress: &'a ProgressTracker,
    cancel: &'a CancellationToken,
    write_concurrency: usize,
    operation_timeout: Duration,
    state: CollectionTaskState,
}

impl<'a> CollectionTask<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        source: &'a ResolvedCredentials,
        target: &'a ResolvedCredentials,
        reader: &'a dyn DocumentStoreClient,
        writer: &'a BatchWriter,
        transform: RecordTransform,
        progress: &'a ProgressTracker,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            target,
            reader,
            writer,
            transform,
            progress,
            cancel,
            write_concurrency: 4,
            operation_timeout: Duration::from_secs(30),
            state: CollectionTaskState::Pending,
        }
    }

    pub fn with_write_concurrency(mut self, write_concurrency: usize) -> Self {
        self.write_concurrency = write_concurrency.max(1);
        self
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }

    pub fn state(&self) -> CollectionTaskState {
        self.state
    }

    fn transition(&mut self, next: CollectionTaskState) {
        debug!(collection = %self.name, from = ?self.state, to = ?next, "Collection task state");
        self.state = next;
    }

    pub async fn run(&mut self) -> Result<CollectionMigrationResult> {
        self.progress.start_collection(&self.name);

        self.transition(CollectionTaskState::Reading);
        let records = match self.read().await {
            Ok(records) => records,
            Err(e) => {
                self.transition(CollectionTaskState::Failed);
                self.progress.record_error(e.to_string());
                return Err(e);
            }
        };

        let mut result = CollectionMigrationResult::new(&self.name);
        result.total_documents = records.len() as u64;
        self.progress.add_documents(result.total_documents);
        info!(
            collection = %self.name,
            total = result.total_documents,
            transform = self.transform.name(),
            "Collection read"
        );

        self.transition(CollectionTaskState::Transforming);
        let batches = self.prepare_batches(records);

        self.transition(CollectionTaskState::Writing);
        self.write_batches(batches, &mut result).await?;

        result.skipped = result
            .total_documents
            .saturating_sub(result.migrated + result.errors);
        if result.skipped > 0 {
            warn!(
                collection = %self.name,
                skipped = result.skipped,
                "Collection stopped by cancellation"
            );
        }

        self.transition(CollectionTaskState::Done);
        info!(
            collection = %self.name,
            migrated = result.migrated,
            errors = result.errors,
            converted = result.converted_records,
            "Collection migrated"
        );
        Ok(result)
    }

    async fn read(&self) -> Result<Vec<Record>> {
        let read = self.reader.read_all_records(self.source, &self.name);
        match timeout(self.operation_timeout, read).await {
            Ok(Ok(records)) => Ok(records),
            Ok(Err(e)) => Err(MigrationError::CollectionReadFailure {
                collection: self.name.clone(),
                message: e.to_string(),
            }),
            Err(_) => Err(MigrationError::CollectionReadFailure {
                collection: self.name.clone(),
                message: format!("read timed out after {:?}", self.operation_timeout),
            }),
        }
    }

    fn prepare_batches(&self, records: Vec<Record>) -> Vec<PreparedBatch> {
        let limit = self.writer.batch_limit();
        let mut batches = Vec::with_capacity(records.len().div_ceil(limit));
        let mut current = PreparedBatch {
            records: Vec::with_capacity(limit.min(records.len())),
            converted: 0,
        };

        for record in records {
            let (record, outcome) = self.transform.apply(record);
            if outcome == TransformOutcome::SecurityConverted {
                current.converted += 1;
            }
            current.records.push(record);

            if current.records.len() == limit {
                batches.push(std::mem::replace(
                    &mut current,
                    PreparedBatch {
                        records: Vec::with_capacity(limit),
                        converted: 0,
                    },
                ));
            }
        }
        if !current.records.is_empty() {
            batches.push(current);
        }

        batches
    }

    /// Dispatch batches with bounded concurrency. Cancellation stops further
    /// dispatch; batches already in flight run to completion.
    ///
    /// `current_document` holds the first id of the most recently dispatched
    /// batch and is cleared whenever no batch is in flight.
    async fn write_batches(
        &self,
        batches: Vec<PreparedBatch>,
        result: &mut CollectionMigrationResult,
    ) -> Result<()> {
        let cancel = self.cancel;
        let progress = self.progress;
        let writer = self.writer;
        let target = self.target;
        let name = self.name.as_str();
        let in_flight = AtomicUsize::new(0);
        let in_flight = &in_flight;

        let writes = stream::iter(batches)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|batch| {
                in_flight.fetch_add(1, Ordering::Relaxed);
                if let Some(first) = batch.records.first() {
                    progress.set_current_document(&first.id);
                }
                async move {
                    let converted = batch.converted;
                    let outcome = writer.write_batch(target, name, batch.records).await;
                    (converted, outcome)
                }
            })
            .buffer_unordered(self.write_concurrency);
        let mut writes = pin!(writes);

        let mut fatal = None;
        while let Some((converted, outcome)) = writes.next().await {
            if in_flight.fetch_sub(1, Ordering::Relaxed) == 1 {
                progress.clear_current_document();
            }
            match outcome {
                Ok(batch) => {
                    let failed = batch.failed();
                    result.migrated += batch.written;
                    result.errors += failed;
                    result.converted_records += converted;
                    result.write_errors.extend(batch.failures);
                    progress.documents_processed(batch.written + failed);
                }
                Err(e) => {
                    fatal.get_or_insert(e);
                }
            }
        }

        match fatal {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::docstore::MemoryDocumentStore;
    use crate::transform::CredentialHashing;
    use std::sync::Arc;

    fn creds(project: &str) -> ResolvedCredentials {
        ResolvedCredentials::Explicit(Credentials::new(project, "svc@example.com", "key"))
    }

    fn seed(store: &MemoryDocumentStore, collection: &str, n: usize) {
        for i in 0..n {
            store.insert(
                "src",
                collection,
                Record::new(format!("{collection}-{i:05}")).with_field("n", i as i64),
            );
        }
    }

    #[tokio::test]
    async fn test_batches_bounded_by_limit() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "orders", 1200);
        let writer = BatchWriter::new(store.clone(), 500, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let (source, target) = (creds("src"), creds("dst"));

        let mut task = CollectionTask::new(
            "orders",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::Identity,
            &progress,
            &cancel,
        );
        let result = task.run().await.unwrap();

        assert_eq!(task.state(), CollectionTaskState::Done);
        assert_eq!(result.total_documents, 1200);
        assert_eq!(result.migrated, 1200);
        assert_eq!(result.errors, 0);
        assert!(result.is_balanced());

        let mut sizes: Vec<_> = store
            .upsert_calls()
            .into_iter()
            .map(|c| c.size)
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![200, 500, 500]);
        assert_eq!(store.records("dst", "orders").len(), 1200);
        assert_eq!(progress.snapshot().processed_documents, 1200);
    }

    #[tokio::test]
    async fn test_hashing_counts_conversions() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.insert("src", "accounts", Record::new("a1").with_field("password", "secret123"));
        store.insert("src", "accounts", Record::new("a2").with_field("email", "x@y"));
        let writer = BatchWriter::new(store.clone(), 500, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let (source, target) = (creds("src"), creds("dst"));

        let mut task = CollectionTask::new(
            "accounts",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::CredentialHashing(CredentialHashing::default()),
            &progress,
            &cancel,
        );
        let result = task.run().await.unwrap();

        assert_eq!(result.converted_records, 1);
        let migrated = store.records("dst", "accounts");
        assert!(migrated.iter().all(|r| r.get("password").is_none()));
        assert!(migrated[0].get("passwordHash").is_some());
    }

    #[tokio::test]
    async fn test_read_failure_fails_task() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_reads_for("orders");
        let writer = BatchWriter::new(store.clone(), 500, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let (source, target) = (creds("src"), creds("dst"));

        let mut task = CollectionTask::new(
            "orders",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::Identity,
            &progress,
            &cancel,
        );
        let result = task.run().await;

        assert!(matches!(
            result,
            Err(MigrationError::CollectionReadFailure { .. })
        ));
        assert_eq!(task.state(), CollectionTaskState::Failed);
        assert!(store.upsert_calls().is_empty());
    }

    #[tokio::test]
    async fn test_read_timeout_fails_task() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "orders", 3);
        store.set_read_delay(Duration::from_millis(500));
        let writer = BatchWriter::new(store.clone(), 500, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let (source, target) = (creds("src"), creds("dst"));

        let mut task = CollectionTask::new(
            "orders",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::Identity,
            &progress,
            &cancel,
        )
        .with_operation_timeout(Duration::from_millis(20));
        let result = task.run().await;

        match result {
            Err(MigrationError::CollectionReadFailure {
                collection,
                message,
            }) => {
                assert_eq!(collection, "orders");
                assert!(message.contains("timed out"));
            }
            other => panic!("expected a read failure, got {other:?}"),
        }
        assert_eq!(task.state(), CollectionTaskState::Failed);
        assert!(store.upsert_calls().is_empty());
        assert!(progress.snapshot().last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_current_document_cleared_after_last_batch() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "orders", 23);
        store.set_write_delay(Duration::from_millis(5));
        let writer = BatchWriter::new(store.clone(), 5, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let (source, target) = (creds("src"), creds("dst"));

        let mut rx = progress.subscribe();
        let observer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                if let Some(id) = rx.borrow_and_update().current_document.clone() {
                    seen.push(id);
                }
            }
            seen
        });

        let mut task = CollectionTask::new(
            "orders",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::Identity,
            &progress,
            &cancel,
        )
        .with_write_concurrency(2);
        let result = task.run().await.unwrap();

        assert_eq!(result.migrated, 23);
        let state = progress.snapshot();
        assert!(state.current_document.is_none());
        // The task never finishes the collection itself
        assert_eq!(state.current_collection.as_deref(), Some("orders"));

        drop(task);
        drop(progress);
        let seen = observer.await.unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|id| id.starts_with("orders-")));
    }

    #[tokio::test]
    async fn test_write_errors_still_done() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "orders", 10);
        store.fail_writes_for("orders-00003");
        let writer = BatchWriter::new(store.clone(), 4, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let (source, target) = (creds("src"), creds("dst"));

        let mut task = CollectionTask::new(
            "orders",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::Identity,
            &progress,
            &cancel,
        )
        .with_write_concurrency(2);
        let result = task.run().await.unwrap();

        assert_eq!(task.state(), CollectionTaskState::Done);
        assert_eq!(result.migrated, 9);
        assert_eq!(result.errors, 1);
        assert_eq!(result.write_errors[0].id, "orders-00003");
        assert!(result.is_balanced());
    }

    #[tokio::test]
    async fn test_cancelled_before_dispatch_skips_everything() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "orders", 20);
        let writer = BatchWriter::new(store.clone(), 5, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (source, target) = (creds("src"), creds("dst"));

        let mut task = CollectionTask::new(
            "orders",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::Identity,
            &progress,
            &cancel,
        );
        let result = task.run().await.unwrap();

        assert_eq!(result.skipped, 20);
        assert_eq!(result.migrated, 0);
        assert!(result.is_balanced());
        assert!(store.upsert_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_mid_run_keeps_batches_whole() {
        let store = Arc::new(MemoryDocumentStore::new());
        seed(&store, "orders", 50);
        store.set_write_delay(Duration::from_millis(50));
        let writer = BatchWriter::new(store.clone(), 5, Duration::from_secs(5));
        let progress = ProgressTracker::new();
        let cancel = CancellationToken::new();
        let (source, target) = (creds("src"), creds("dst"));

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            canceller.cancel();
        });

        let mut task = CollectionTask::new(
            "orders",
            &source,
            &target,
            store.as_ref(),
            &writer,
            RecordTransform::Identity,
            &progress,
            &cancel,
        )
        .with_write_concurrency(1);
        let result = task.run().await.unwrap();

        assert!(result.skipped > 0);
        assert!(result.is_balanced());
        // Every dispatched batch landed in full
        assert_eq!(result.migrated % 5, 0);
        assert_eq!(store.records("dst", "orders").len() as u64, result.migrated);
        assert!(store.upsert_calls().iter().all(|c| c.size == 5));
    }
}
