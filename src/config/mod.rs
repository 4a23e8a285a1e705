//! Configuration management for ShiftBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use shiftbox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `SHIFTBOX__<section>__<key>`
//!
//! Examples:
//! - `SHIFTBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `SHIFTBOX__ENGINE__BATCH_LIMIT=250`
//! - `SHIFTBOX__ENGINE__PART_SIZE=16MB`
//! - `SHIFTBOX__JOBS__RETENTION_SECS=3600`
//!
//! Default source and target credentials are secrets and only come from the
//! environment: `SHIFTBOX_SOURCE_PROJECT_ID`, `SHIFTBOX_SOURCE_PRINCIPAL_EMAIL`,
//! `SHIFTBOX_SOURCE_PRIVATE_KEY` and the same with `TARGET`.
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/shiftbox.toml`.
//! This can be overridden using the `SHIFTBOX_CONFIG` environment variable.

mod models;
mod resolver;
mod sources;
mod validation;

// Re-export public types
pub use crate::humanize::ByteSize;
pub use models::{
    ApiLimits, BackendConfig, BlobProvider, Config, CredentialsConfig, EngineConfig, JobsConfig,
    ServerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`SHIFTBOX__*`)
    /// 2. TOML file (default: `config/shiftbox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file is malformed
    /// - Validation fails (limits out of range, bad transform fields, etc.)
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from an explicit file, with environment overrides
    /// and secrets applied as in [`Config::load`]
    pub fn load_file(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_file(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Useful for testing with custom configuration files. Secrets are not
    /// read from the environment.
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::RecordTransform;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[transforms.accounts]
kind = "credential_hashing"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.transforms.len(), 1);
        assert_eq!(config.engine.batch_limit, 500);
    }

    #[test]
    fn test_validation_catches_batch_limit() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[engine]
batch_limit = 1000
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::BatchLimitOutOfRange { .. })
        ));
    }

    #[test]
    fn test_unknown_transform_kind_fails_to_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[transforms.accounts]
kind = "encrypt"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        assert!(matches!(
            Config::load_from_path(config_path),
            Err(ConfigError::LoadError(_))
        ));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config =
            Config::load_from_path(std::path::PathBuf::from("config/shiftbox.toml")).unwrap();
        assert_eq!(config.engine.part_size, ByteSize(8 * 1024 * 1024));
        assert!(config.transform_registry().has_transform("accounts"));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"

[server.api]
max_payload_bytes = "1MB"

[engine]
batch_limit = 500
write_concurrency = 4
blob_concurrency = 8
operation_timeout_secs = 30
part_size = "5MB"

[backend]
data_dir = "data/projects"
blob_provider = "local"
blob_dir = "data/blobs"

[credentials]
ambient_project_vars = ["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"]

[jobs]
retention_secs = 3600

[transforms.accounts]
kind = "credential_hashing"
password_field = "password"
salt_field = "passwordSalt"
hash_field = "passwordHash"

[transforms.orders]
kind = "identity"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.backend.blob_provider, BlobProvider::Local);
        assert_eq!(config.credentials.ambient_project_vars.len(), 2);
        assert_eq!(config.jobs.retention(), std::time::Duration::from_secs(3600));
        assert_eq!(config.transforms.len(), 2);
        assert_eq!(
            config.transforms.get("orders"),
            Some(&RecordTransform::Identity)
        );

        let registry = config.transform_registry();
        assert!(matches!(
            registry.plan_for("accounts"),
            RecordTransform::CredentialHashing(_)
        ));
    }
}
