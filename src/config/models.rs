use crate::credentials::{Credentials, DEFAULT_AMBIENT_PROJECT_VARS};
use crate::humanize::ByteSize;
use crate::transform::RecordTransform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    /// Collection name -> transform
    #[serde(default)]
    pub transforms: BTreeMap<String, RecordTransform>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub api: ApiLimits,
}

/// API request limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api: ApiLimits::default(),
        }
    }
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(1024 * 1024) // 1 MB
}

/// Migration engine tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Records per write batch, at most the backend limit (500)
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    #[serde(default = "default_write_concurrency")]
    pub write_concurrency: usize,
    #[serde(default = "default_blob_concurrency")]
    pub blob_concurrency: usize,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Multipart upload part size for blob copies
    #[serde(default = "default_part_size")]
    pub part_size: ByteSize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_limit: default_batch_limit(),
            write_concurrency: default_write_concurrency(),
            blob_concurrency: default_blob_concurrency(),
            operation_timeout_secs: default_operation_timeout_secs(),
            part_size: default_part_size(),
        }
    }
}

fn default_batch_limit() -> usize {
    crate::docstore::REFERENCE_BATCH_LIMIT
}

fn default_write_concurrency() -> usize {
    4
}

fn default_blob_concurrency() -> usize {
    8
}

fn default_operation_timeout_secs() -> u64 {
    30
}

fn default_part_size() -> ByteSize {
    ByteSize(5 * 1024 * 1024) // 5 MB
}

/// Job registry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobsConfig {
    /// How long a finished job (progress and result) stays queryable
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

fn default_retention_secs() -> u64 {
    24 * 60 * 60 // 1 day
}

/// Blob bucket provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobProvider {
    Memory,
    #[default]
    Local,
}

/// Backend locations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Root of the per-project document keyspaces
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub blob_provider: BlobProvider,
    /// Root of the per-project blob buckets (local provider)
    #[serde(default = "default_blob_dir")]
    pub blob_dir: PathBuf,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            blob_provider: BlobProvider::default(),
            blob_dir: default_blob_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/projects")
}

fn default_blob_dir() -> PathBuf {
    PathBuf::from("data/blobs")
}

/// Credential settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    /// Environment variables holding the ambient project id, in lookup order
    #[serde(default = "default_ambient_project_vars")]
    pub ambient_project_vars: Vec<String>,
    /// Default source credentials (loaded from environment, not from config file)
    #[serde(skip)]
    pub source: Option<Credentials>,
    /// Default target credentials (loaded from environment, not from config file)
    #[serde(skip)]
    pub target: Option<Credentials>,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            ambient_project_vars: default_ambient_project_vars(),
            source: None,
            target: None,
        }
    }
}

fn default_ambient_project_vars() -> Vec<String> {
    DEFAULT_AMBIENT_PROJECT_VARS
        .iter()
        .map(|v| v.to_string())
        .collect()
}
