//! In-process document store with fault injection (tests, local demos)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::error::{DocumentStoreError, Result};
use super::{DocumentStoreClient, REFERENCE_BATCH_LIMIT, WriteOutcome};
use crate::credentials::ResolvedCredentials;
use crate::record::{Fields, Record};

type Collections = BTreeMap<String, BTreeMap<String, Fields>>;

#[derive(Debug, Default)]
struct Faults {
    catalog_unavailable: bool,
    read_failures: HashSet<String>,
    write_failures: HashSet<String>,
    batch_failures: HashSet<String>,
    read_delay: Option<Duration>,
    write_delay: Option<Duration>,
}

/// One recorded `upsert_batch` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertCall {
    pub project_id: String,
    pub collection: String,
    pub size: usize,
}

/// Document store held entirely in memory, keyed by project id
#[derive(Debug)]
pub struct MemoryDocumentStore {
    projects: Mutex<HashMap<String, Collections>>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<UpsertCall>>,
    batch_limit: usize,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_batch_limit(REFERENCE_BATCH_LIMIT)
    }

    pub fn with_batch_limit(batch_limit: usize) -> Self {
        Self {
            projects: Mutex::new(HashMap::new()),
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Vec::new()),
            batch_limit,
        }
    }

    /// Seed a record directly, bypassing batching
    pub fn insert(&self, project_id: &str, collection: &str, record: Record) {
        let mut projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        projects
            .entry(project_id.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .insert(record.id, record.fields);
    }

    /// Snapshot of a collection, ordered by id
    pub fn records(&self, project_id: &str, collection: &str) -> Vec<Record> {
        let projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        projects
            .get(project_id)
            .and_then(|collections| collections.get(collection))
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Record {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Make collection enumeration fail
    pub fn fail_catalog(&self) {
        self.faults().catalog_unavailable = true;
    }

    /// Make reads of `collection` fail
    pub fn fail_reads_for(&self, collection: &str) {
        self.faults().read_failures.insert(collection.to_string());
    }

    /// Make the write of a single record id fail
    pub fn fail_writes_for(&self, id: &str) {
        self.faults().write_failures.insert(id.to_string());
    }

    /// Make every batch containing `id` fail as a whole
    pub fn fail_batches_containing(&self, id: &str) {
        self.faults().batch_failures.insert(id.to_string());
    }

    /// Delay collection listings and reads, used to trip timeouts
    pub fn set_read_delay(&self, delay: Duration) {
        self.faults().read_delay = Some(delay);
    }

    /// Delay every batch write, used to keep batches in flight
    pub fn set_write_delay(&self, delay: Duration) {
        self.faults().write_delay = Some(delay);
    }

    /// Recorded upsert calls in completion order
    pub fn upsert_calls(&self) -> Vec<UpsertCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn read_pause(&self) {
        let delay = self.faults().read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl DocumentStoreClient for MemoryDocumentStore {
    async fn list_collection_names(&self, creds: &ResolvedCredentials) -> Result<Vec<String>> {
        self.read_pause().await;
        if self.faults().catalog_unavailable {
            return Err(DocumentStoreError::Unavailable(
                "collection listing denied".to_string(),
            ));
        }

        let projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
        Ok(projects
            .get(creds.project_id())
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn read_all_records(
        &self,
        creds: &ResolvedCredentials,
        collection: &str,
    ) -> Result<Vec<Record>> {
        self.read_pause().await;
        if self.faults().read_failures.contains(collection) {
            return Err(DocumentStoreError::Unavailable(format!(
                "read of '{}' denied",
                collection
            )));
        }

        Ok(self.records(creds.project_id(), collection))
    }

    async fn upsert_batch(
        &self,
        creds: &ResolvedCredentials,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<WriteOutcome>> {
        if records.len() > self.batch_limit {
            return Err(DocumentStoreError::BatchTooLarge {
                size: records.len(),
                limit: self.batch_limit,
            });
        }

        let (delay, failing_ids, batch_fails) = {
            let faults = self.faults();
            let batch_fails = records
                .iter()
                .any(|r| faults.batch_failures.contains(&r.id));
            (faults.write_delay, faults.write_failures.clone(), batch_fails)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if batch_fails {
            return Err(DocumentStoreError::Unavailable("batch rejected".to_string()));
        }

        let size = records.len();
        let mut outcomes = Vec::with_capacity(size);
        {
            let mut projects = self.projects.lock().unwrap_or_else(|e| e.into_inner());
            let docs = projects
                .entry(creds.project_id().to_string())
                .or_default()
                .entry(collection.to_string())
                .or_default();

            for record in records {
                if failing_ids.contains(&record.id) {
                    outcomes.push(WriteOutcome::failed(record.id, "permission denied"));
                    continue;
                }

                docs.entry(record.id.clone())
                    .or_default()
                    .extend(record.fields);
                outcomes.push(WriteOutcome::ok(record.id));
            }
        }

        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(UpsertCall {
                project_id: creds.project_id().to_string(),
                collection: collection.to_string(),
                size,
            });

        Ok(outcomes)
    }

    fn max_batch_size(&self) -> usize {
        self.batch_limit
    }
}
