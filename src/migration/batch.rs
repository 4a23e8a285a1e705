use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use super::types::RecordFailure;
use crate::credentials::ResolvedCredentials;
use crate::docstore::DocumentStoreClient;
use crate::error::{MigrationError, Result};
use crate::record::Record;

/// Outcome of one batch upsert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchWriteResult {
    pub written: u64,
    pub failures: Vec<RecordFailure>,
}

impl BatchWriteResult {
    pub fn failed(&self) -> u64 {
        self.failures.len() as u64
    }

    fn all_failed(collection: &str, ids: &[String], message: &str) -> Self {
        Self {
            written: 0,
            failures: ids
                .iter()
                .map(|id| RecordFailure::write_error(collection, id.as_str(), message))
                .collect(),
        }
    }
}

/// Writes record batches to the target, never exceeding the batch limit
#[derive(Clone)]
pub struct BatchWriter {
    store: Arc<dyn DocumentStoreClient>,
    batch_limit: usize,
    operation_timeout: Duration,
}

impl BatchWriter {
    /// `batch_limit` is capped by the store's own maximum
    pub fn new(
        store: Arc<dyn DocumentStoreClient>,
        batch_limit: usize,
        operation_timeout: Duration,
    ) -> Self {
        let batch_limit = batch_limit.clamp(1, store.max_batch_size().max(1));
        Self {
            store,
            batch_limit,
            operation_timeout,
        }
    }

    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Upsert one batch.
    ///
    /// An oversized batch is rejected before the backend is touched. A
    /// failed or timed-out call marks every record of the batch as failed;
    /// nothing is retried.
    pub async fn write_batch(
        &self,
        target: &ResolvedCredentials,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<BatchWriteResult> {
        if records.len() > self.batch_limit {
            return Err(MigrationError::InvalidJob(format!(
                "batch of {} records exceeds limit of {}",
                records.len(),
                self.batch_limit
            )));
        }
        if records.is_empty() {
            return Ok(BatchWriteResult::default());
        }

        let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        let size = records.len();

        let call = self.store.upsert_batch(target, collection, records);
        let outcomes = match timeout(self.operation_timeout, call).await {
            Ok(Ok(outcomes)) => outcomes,
            Ok(Err(e)) => {
                warn!(collection, size, error = %e, "Batch write failed");
                return Ok(BatchWriteResult::all_failed(collection, &ids, &e.to_string()));
            }
            Err(_) => {
                warn!(collection, size, "Batch write timed out");
                let message = format!("batch write timed out after {:?}", self.operation_timeout);
                return Ok(BatchWriteResult::all_failed(collection, &ids, &message));
            }
        };

        let mut result = BatchWriteResult::default();
        let mut reported = std::collections::HashSet::with_capacity(outcomes.len());
        for outcome in outcomes {
            reported.insert(outcome.id.clone());
            match outcome.error {
                None => result.written += 1,
                Some(message) => result
                    .failures
                    .push(RecordFailure::write_error(collection, outcome.id, message)),
            }
        }

        // Ids the backend never reported on are counted as failed
        for id in ids.iter().filter(|id| !reported.contains(*id)) {
            result.failures.push(RecordFailure::write_error(
                collection,
                id.as_str(),
                "no write outcome reported",
            ));
        }

        debug!(
            collection,
            size,
            written = result.written,
            failed = result.failed(),
            "Batch written"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;
    use crate::docstore::MemoryDocumentStore;

    fn target() -> ResolvedCredentials {
        ResolvedCredentials::Explicit(Credentials::new("proj-b", "svc@example.com", "key"))
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::new(format!("r{i}"))).collect()
    }

    #[tokio::test]
    async fn test_oversized_batch_is_invalid_job() {
        let store = Arc::new(MemoryDocumentStore::new());
        let writer = BatchWriter::new(store.clone(), 500, Duration::from_secs(5));

        let result = writer.write_batch(&target(), "orders", records(501)).await;

        assert!(matches!(result, Err(MigrationError::InvalidJob(_))));
        assert!(store.upsert_calls().is_empty());
    }

    #[test]
    fn test_limit_capped_by_store() {
        let store = Arc::new(MemoryDocumentStore::with_batch_limit(100));
        let writer = BatchWriter::new(store, 500, Duration::from_secs(5));
        assert_eq!(writer.batch_limit(), 100);
    }

    #[tokio::test]
    async fn test_partial_failure_reports_ids() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_writes_for("r1");
        let writer = BatchWriter::new(store.clone(), 500, Duration::from_secs(5));

        let result = writer.write_batch(&target(), "orders", records(3)).await.unwrap();

        assert_eq!(result.written, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].id, "r1");
        assert_eq!(result.failures[0].kind, crate::error::ErrorKind::RecordWriteError);
        assert!(result.failures[0].message.ends_with("permission denied"));
        assert_eq!(store.records("proj-b", "orders").len(), 2);
    }

    #[tokio::test]
    async fn test_whole_batch_failure_fails_every_record() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.fail_batches_containing("r0");
        let writer = BatchWriter::new(store, 500, Duration::from_secs(5));

        let result = writer.write_batch(&target(), "orders", records(4)).await.unwrap();

        assert_eq!(result.written, 0);
        assert_eq!(result.failed(), 4);
    }

    #[tokio::test]
    async fn test_timeout_fails_every_record() {
        let store = Arc::new(MemoryDocumentStore::new());
        store.set_write_delay(Duration::from_millis(200));
        let writer = BatchWriter::new(store, 500, Duration::from_millis(20));

        let result = writer.write_batch(&target(), "orders", records(2)).await.unwrap();

        assert_eq!(result.failed(), 2);
        assert!(result.failures[0].message.contains("timed out"));
    }
}
