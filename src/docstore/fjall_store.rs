use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::{debug, info, warn};

use super::error::{DocumentStoreError, Result};
use super::keys::{
    decode_collection_key, decode_record_id, encode_collection_key, encode_collection_prefix,
    encode_record_key, is_valid_collection_name,
};
use super::{DocumentStoreClient, WriteOutcome, validate_project_id};
use crate::credentials::ResolvedCredentials;
use crate::record::{Fields, Record};

/// Open keyspace for one project
#[derive(Clone)]
struct ProjectKeyspace {
    keyspace: Keyspace,
    records: PartitionHandle,
    collections: PartitionHandle,
}

impl ProjectKeyspace {
    fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)?;

        let keyspace = Config::new(path).open()?;
        let records = keyspace.open_partition("records", PartitionCreateOptions::default())?;
        let collections =
            keyspace.open_partition("collections", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            records,
            collections,
        })
    }

    fn upsert_one(&self, collection: &str, record: Record) -> Result<()> {
        let key = encode_record_key(collection, &record.id);

        let merged = match self.records.get(&key)? {
            Some(existing) => {
                let mut stored = Record {
                    id: record.id.clone(),
                    fields: serde_json::from_slice::<Fields>(&existing)?,
                };
                stored.merge_from(record.fields);
                stored.fields
            }
            None => record.fields,
        };

        self.records.insert(key, serde_json::to_vec(&merged)?)?;
        Ok(())
    }
}

/// Fjall-backed document store: one keyspace per project under `root`
///
/// Layout: `{root}/{project_id}/` holds the `records` and `collections`
/// partitions described in [`super::keys`].
pub struct FjallDocumentStore {
    root: PathBuf,
    projects: Mutex<HashMap<String, ProjectKeyspace>>,
}

impl FjallDocumentStore {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        info!("Opening document store at: {}", root.display());

        Ok(Self {
            root,
            projects: Mutex::new(HashMap::new()),
        })
    }

    fn project(&self, creds: &ResolvedCredentials) -> Result<ProjectKeyspace> {
        let project_id = creds.project_id();
        validate_project_id(project_id)?;

        let mut projects = self
            .projects
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("project cache poisoned".to_string()))?;

        if let Some(project) = projects.get(project_id) {
            return Ok(project.clone());
        }

        let path = self.root.join(project_id);
        debug!(project_id, path = %path.display(), "Opening project keyspace");
        let project = ProjectKeyspace::open(&path)?;
        projects.insert(project_id.to_string(), project.clone());

        Ok(project)
    }

    /// Persist all pending writes of every open project to disk
    pub fn persist(&self) -> Result<()> {
        let projects = self
            .projects
            .lock()
            .map_err(|_| DocumentStoreError::Unavailable("project cache poisoned".to_string()))?;

        for project in projects.values() {
            project.keyspace.persist(fjall::PersistMode::SyncAll)?;
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStoreClient for FjallDocumentStore {
    async fn list_collection_names(&self, creds: &ResolvedCredentials) -> Result<Vec<String>> {
        let project = self.project(creds)?;
        let mut names = Vec::new();

        for item in project.collections.iter() {
            let (key, _) = item?;
            match decode_collection_key(&key) {
                Some(name) => names.push(name),
                None => warn!(key = ?key, "Skipping malformed collection key"),
            }
        }

        Ok(names)
    }

    async fn read_all_records(
        &self,
        creds: &ResolvedCredentials,
        collection: &str,
    ) -> Result<Vec<Record>> {
        let project = self.project(creds)?;
        let prefix = encode_collection_prefix(collection);
        let mut records = Vec::new();

        for item in project.records.prefix(&prefix) {
            let (key, value) = item?;
            let id = decode_record_id(collection, &key).ok_or_else(|| {
                DocumentStoreError::InvalidKey(String::from_utf8_lossy(&key).to_string())
            })?;
            let fields: Fields = serde_json::from_slice(&value)?;
            records.push(Record { id, fields });
        }

        debug!(
            project_id = creds.project_id(),
            collection,
            count = records.len(),
            "Read collection"
        );
        Ok(records)
    }

    async fn upsert_batch(
        &self,
        creds: &ResolvedCredentials,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<Vec<WriteOutcome>> {
        let limit = self.max_batch_size();
        if records.len() > limit {
            return Err(DocumentStoreError::BatchTooLarge {
                size: records.len(),
                limit,
            });
        }
        if !is_valid_collection_name(collection) {
            return Err(DocumentStoreError::InvalidKey(collection.to_string()));
        }

        let project = self.project(creds)?;
        project
            .collections
            .insert(encode_collection_key(collection), Vec::<u8>::new())?;

        let outcomes = records
            .into_iter()
            .map(|record| {
                let id = record.id.clone();
                match project.upsert_one(collection, record) {
                    Ok(()) => WriteOutcome::ok(id),
                    Err(e) => WriteOutcome::failed(id, e.to_string()),
                }
            })
            .collect();

        Ok(outcomes)
    }
}
