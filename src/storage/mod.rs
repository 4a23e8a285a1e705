//! Blob storage clients
//! Uses Apache Arrow object_store crate
//!
//! Blobs are grouped by folder prefixes (`images/`, `invoices/2024/`, ...).
//! Copies carry the content type and custom metadata of the source object;
//! access-control settings are not part of the contract.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use object_store::{
    Attribute, AttributeValue, Attributes, ObjectStore, PutMultipartOpts, PutOptions, PutPayload,
    WriteMultipart, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath,
};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use thiserror::Error;

use crate::credentials::ResolvedCredentials;

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid project id: {0}")]
    InvalidProject(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, BlobStoreError>;

/// Streamed blob body
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Custom (user-defined) object metadata
pub type BlobMetadata = BTreeMap<String, String>;

/// Parts kept in flight by a multipart upload
const MAX_INFLIGHT_PARTS: usize = 4;

/// Listing entry for a single blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub path: String,
    pub size: u64,
}

/// Open blob read: body stream plus the attributes to carry over
pub struct BlobRead {
    pub stream: ByteStream,
    pub content_type: Option<String>,
    pub metadata: BlobMetadata,
    pub size: u64,
}

impl std::fmt::Debug for BlobRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobRead")
            .field("content_type", &self.content_type)
            .field("metadata", &self.metadata)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait BlobStoreClient: Send + Sync {
    /// Top-level folder prefixes of the project bucket
    async fn list_prefixes(&self, creds: &ResolvedCredentials) -> Result<Vec<String>>;

    /// Blobs under `prefix`; an empty prefix lists the whole bucket
    async fn list_blobs(&self, creds: &ResolvedCredentials, prefix: &str) -> Result<Vec<BlobEntry>>;

    async fn read_blob(&self, creds: &ResolvedCredentials, path: &str) -> Result<BlobRead>;

    /// Stream `body` to `path`, returning the number of bytes written
    async fn write_blob(
        &self,
        creds: &ResolvedCredentials,
        path: &str,
        body: ByteStream,
        content_type: Option<String>,
        metadata: BlobMetadata,
    ) -> Result<u64>;
}

/// Where project buckets live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BucketLocation {
    /// One in-memory bucket per project, created on first use
    Memory,
    /// One directory per project under the given root
    Local(PathBuf),
}

/// Blob client backed by one object_store bucket per project
#[derive(Clone)]
pub struct ObjectStoreBlobClient {
    location: BucketLocation,
    buckets: Arc<RwLock<HashMap<String, Arc<dyn ObjectStore>>>>,
    part_size: usize,
}

impl ObjectStoreBlobClient {
    pub fn new(location: BucketLocation, part_size: usize) -> Self {
        Self {
            location,
            buckets: Arc::new(RwLock::new(HashMap::new())),
            part_size: part_size.max(1),
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(BucketLocation::Memory, 5 * 1024 * 1024)
    }

    fn bucket(&self, creds: &ResolvedCredentials) -> Result<Arc<dyn ObjectStore>> {
        let project_id = creds.project_id();

        if let Some(store) = self
            .buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(project_id)
        {
            return Ok(store.clone());
        }

        if project_id.is_empty() || project_id.contains(['/', '\\']) || project_id.starts_with('.') {
            return Err(BlobStoreError::InvalidProject(project_id.to_string()));
        }

        let store: Arc<dyn ObjectStore> = match &self.location {
            BucketLocation::Memory => Arc::new(InMemory::new()),
            BucketLocation::Local(root) => {
                let dir = root.join(project_id);
                std::fs::create_dir_all(&dir)?;
                Arc::new(LocalFileSystem::new_with_prefix(dir)?)
            }
        };

        let mut buckets = self.buckets.write().unwrap_or_else(|e| e.into_inner());
        Ok(buckets
            .entry(project_id.to_string())
            .or_insert(store)
            .clone())
    }

    /// Local filesystem buckets cannot persist object attributes
    fn supports_attributes(&self) -> bool {
        matches!(self.location, BucketLocation::Memory)
    }

    /// Upload bytes to storage in one call
    pub async fn upload(
        &self,
        creds: &ResolvedCredentials,
        key: &str,
        data: Vec<u8>,
        content_type: Option<String>,
        metadata: BlobMetadata,
    ) -> Result<u64> {
        let body = stream::once(async move { Ok(Bytes::from(data)) }).boxed();
        self.write_blob(creds, key, body, content_type, metadata).await
    }

    /// Download from storage
    pub async fn download(&self, creds: &ResolvedCredentials, key: &str) -> Result<Vec<u8>> {
        let read = self.read_blob(creds, key).await?;
        let chunks: Vec<Bytes> = read.stream.try_collect().await?;

        tracing::debug!(key, size = read.size, "Downloaded from storage");

        Ok(chunks.concat())
    }
}

fn to_attributes(content_type: Option<String>, metadata: BlobMetadata) -> Attributes {
    let mut attributes = Attributes::new();
    if let Some(content_type) = content_type {
        attributes.insert(Attribute::ContentType, AttributeValue::from(content_type));
    }
    for (key, value) in metadata {
        attributes.insert(Attribute::Metadata(key.into()), AttributeValue::from(value));
    }
    attributes
}

fn from_attributes(attributes: &Attributes) -> (Option<String>, BlobMetadata) {
    let mut content_type = None;
    let mut metadata = BlobMetadata::new();

    for (attribute, value) in attributes.iter() {
        let value: &str = value.as_ref();
        match attribute {
            Attribute::ContentType => content_type = Some(value.to_string()),
            Attribute::Metadata(key) => {
                metadata.insert(key.to_string(), value.to_string());
            }
            _ => {}
        }
    }

    (content_type, metadata)
}

fn not_found_or(path: &str, err: object_store::Error) -> BlobStoreError {
    match err {
        object_store::Error::NotFound { .. } => BlobStoreError::NotFound(path.to_string()),
        other => other.into(),
    }
}

#[async_trait]
impl BlobStoreClient for ObjectStoreBlobClient {
    async fn list_prefixes(&self, creds: &ResolvedCredentials) -> Result<Vec<String>> {
        let store = self.bucket(creds)?;
        let listing = store.list_with_delimiter(None).await?;

        Ok(listing
            .common_prefixes
            .into_iter()
            .map(|p| p.to_string())
            .collect())
    }

    async fn list_blobs(&self, creds: &ResolvedCredentials, prefix: &str) -> Result<Vec<BlobEntry>> {
        let store = self.bucket(creds)?;
        let prefix = prefix.trim_matches('/');
        let prefix_path = (!prefix.is_empty()).then(|| StoragePath::from(prefix));

        let objects: Vec<_> = store.list(prefix_path.as_ref()).try_collect().await?;

        Ok(objects
            .into_iter()
            .map(|meta| BlobEntry {
                path: meta.location.to_string(),
                size: meta.size,
            })
            .collect())
    }

    async fn read_blob(&self, creds: &ResolvedCredentials, path: &str) -> Result<BlobRead> {
        let store = self.bucket(creds)?;
        let location = StoragePath::from(path);

        let result = store
            .get(&location)
            .await
            .map_err(|e| not_found_or(path, e))?;

        let (content_type, metadata) = from_attributes(&result.attributes);
        let size = result.meta.size;
        let stream = result.into_stream().map_err(BlobStoreError::from).boxed();

        Ok(BlobRead {
            stream,
            content_type,
            metadata,
            size,
        })
    }

    async fn write_blob(
        &self,
        creds: &ResolvedCredentials,
        path: &str,
        mut body: ByteStream,
        content_type: Option<String>,
        metadata: BlobMetadata,
    ) -> Result<u64> {
        let store = self.bucket(creds)?;
        let location = StoragePath::from(path);
        let attributes = if self.supports_attributes() {
            to_attributes(content_type, metadata)
        } else {
            Attributes::new()
        };

        // Small bodies go out as a single put; anything reaching a full part
        // switches to a multipart upload.
        let mut buffered: Vec<Bytes> = Vec::new();
        let mut buffered_len = 0usize;
        let mut writer: Option<WriteMultipart> = None;
        let mut written = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    if let Some(writer) = writer {
                        if let Err(abort_err) = writer.abort().await {
                            tracing::warn!(path, error = %abort_err, "Failed to abort multipart upload");
                        }
                    }
                    return Err(BlobStoreError::Stream(e.to_string()));
                }
            };
            written += chunk.len() as u64;

            match writer.as_mut() {
                Some(writer) => {
                    writer.wait_for_capacity(MAX_INFLIGHT_PARTS).await?;
                    writer.write(&chunk);
                }
                None => {
                    buffered_len += chunk.len();
                    buffered.push(chunk);

                    if buffered_len >= self.part_size {
                        let opts = PutMultipartOpts {
                            attributes: attributes.clone(),
                            ..Default::default()
                        };
                        let upload = store.put_multipart_opts(&location, opts).await?;
                        let mut multipart = WriteMultipart::new_with_chunk_size(upload, self.part_size);
                        for pending in buffered.drain(..) {
                            multipart.write(&pending);
                        }
                        writer = Some(multipart);
                    }
                }
            }
        }

        match writer {
            Some(writer) => {
                writer.finish().await?;
            }
            None => {
                let payload: PutPayload = buffered.into_iter().collect();
                let opts = PutOptions {
                    attributes,
                    ..Default::default()
                };
                store.put_opts(&location, payload, opts).await?;
            }
        }

        tracing::debug!(path, size = written, "Uploaded to storage");

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;

    fn creds(project: &str) -> ResolvedCredentials {
        ResolvedCredentials::Explicit(Credentials::new(project, "svc@example.com", "key"))
    }

    fn meta(pairs: &[(&str, &str)]) -> BlobMetadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_upload_and_read_keeps_attributes() {
        let client = ObjectStoreBlobClient::in_memory();
        let project = creds("proj-a");

        client
            .upload(
                &project,
                "images/logo.png",
                b"png-bytes".to_vec(),
                Some("image/png".to_string()),
                meta(&[("owner", "u1")]),
            )
            .await
            .unwrap();

        let read = client.read_blob(&project, "images/logo.png").await.unwrap();
        assert_eq!(read.content_type.as_deref(), Some("image/png"));
        assert_eq!(read.metadata.get("owner").map(String::as_str), Some("u1"));
        assert_eq!(read.size, 9);

        let bytes = client.download(&project, "images/logo.png").await.unwrap();
        assert_eq!(bytes, b"png-bytes");
    }

    #[tokio::test]
    async fn test_list_prefixes_and_blobs() {
        let client = ObjectStoreBlobClient::in_memory();
        let project = creds("proj-a");

        for key in ["images/a.png", "images/b.png", "docs/c.pdf", "root.txt"] {
            client
                .upload(&project, key, vec![1, 2, 3], None, BlobMetadata::new())
                .await
                .unwrap();
        }

        let mut prefixes = client.list_prefixes(&project).await.unwrap();
        prefixes.sort();
        assert_eq!(prefixes, vec!["docs".to_string(), "images".to_string()]);

        let images = client.list_blobs(&project, "images/").await.unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|b| b.size == 3));

        let everything = client.list_blobs(&project, "").await.unwrap();
        assert_eq!(everything.len(), 4);
    }

    #[tokio::test]
    async fn test_multipart_path_for_large_bodies() {
        let client = ObjectStoreBlobClient::new(BucketLocation::Memory, 4);
        let project = creds("proj-a");

        let chunks: Vec<Result<Bytes>> = (0..5)
            .map(|i| Ok(Bytes::from(vec![i as u8; 3])))
            .collect();
        let written = client
            .write_blob(
                &project,
                "big/file.bin",
                stream::iter(chunks).boxed(),
                Some("application/octet-stream".to_string()),
                BlobMetadata::new(),
            )
            .await
            .unwrap();

        assert_eq!(written, 15);
        let bytes = client.download(&project, "big/file.bin").await.unwrap();
        assert_eq!(bytes.len(), 15);
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_found() {
        let client = ObjectStoreBlobClient::in_memory();
        let result = client.read_blob(&creds("proj-a"), "nope.txt").await;
        assert!(matches!(result, Err(BlobStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_local_buckets_per_project() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let client = ObjectStoreBlobClient::new(
            BucketLocation::Local(temp_dir.path().to_path_buf()),
            1024,
        );

        client
            .upload(
                &creds("proj-a"),
                "docs/a.txt",
                b"hello".to_vec(),
                Some("text/plain".to_string()),
                BlobMetadata::new(),
            )
            .await
            .unwrap();

        assert!(temp_dir.path().join("proj-a").join("docs").join("a.txt").exists());
        let other = client.list_blobs(&creds("proj-b"), "").await.unwrap();
        assert!(other.is_empty());
    }
}
