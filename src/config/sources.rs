use super::models::Config;
use crate::credentials::Credentials;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "SHIFTBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/shiftbox.toml";
const ENV_PREFIX: &str = "SHIFTBOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Load .env file first so SHIFTBOX_CONFIG may come from it
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_file(config_path)
}

/// Same as [`load`] with an explicit file path
pub fn load_file(config_path: PathBuf) -> Result<Config, ConfigError> {
    // Ignore errors if .env doesn't exist
    let _ = dotenvy::dotenv();

    let mut config = load_from_sources(config_path)?;

    // Load secrets from environment variables
    load_secrets(&mut config);

    Ok(config)
}

/// Load secrets from environment variables into config
/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    config.credentials.source = credentials_from_env(|name| env::var(name).ok(), "SOURCE");
    config.credentials.target = credentials_from_env(|name| env::var(name).ok(), "TARGET");
}

/// Read `SHIFTBOX_{SIDE}_PROJECT_ID`, `_PRINCIPAL_EMAIL` and `_PRIVATE_KEY`.
/// Returns `None` when none of the three is set.
fn credentials_from_env<F>(lookup: F, side: &str) -> Option<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |field: &str| lookup(&format!("{ENV_PREFIX}_{side}_{field}"));

    let project_id = var("PROJECT_ID");
    let principal_email = var("PRINCIPAL_EMAIL");
    let private_key = var("PRIVATE_KEY").map(|key| key.replace("\\n", "\n"));

    if project_id.is_none() && principal_email.is_none() && private_key.is_none() {
        return None;
    }

    Some(Credentials::new(
        project_id.unwrap_or_default(),
        principal_email.unwrap_or_default(),
        private_key.unwrap_or_default(),
    ))
}

/// Load configuration from a specific path and environment
/// Useful for testing with custom config files
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    // Start with defaults (handled by struct Default implementations)
    // Add TOML file if it exists (optional)
    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // Add environment variable overrides
    // SHIFTBOX__ENGINE__BATCH_LIMIT -> engine.batch_limit
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BlobProvider;
    use crate::transform::RecordTransform;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.engine.batch_limit, 500);
        assert_eq!(config.engine.write_concurrency, 4);
        assert!(config.transforms.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"

[server.api]
max_payload_bytes = "512KB"

[engine]
batch_limit = 250
operation_timeout_secs = 10
part_size = "8MB"

[backend]
data_dir = "/var/lib/shiftbox/projects"
blob_provider = "memory"

[transforms.accounts]
kind = "credential_hashing"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.server.api.max_payload_bytes.as_u64(), 512 * 1024);
        assert_eq!(config.engine.batch_limit, 250);
        assert_eq!(config.engine.operation_timeout_secs, 10);
        assert_eq!(config.engine.part_size.as_u64(), 8 * 1024 * 1024);
        assert_eq!(config.backend.blob_provider, BlobProvider::Memory);
        assert!(matches!(
            config.transforms.get("accounts"),
            Some(RecordTransform::CredentialHashing(_))
        ));
    }

    // Process environment is not mutated in tests (`env::set_var` is unsafe
    // under edition 2024); secrets parsing is tested through an injected lookup.

    #[test]
    fn test_credentials_from_env_lookup() {
        let vars: HashMap<&str, &str> = [
            ("SHIFTBOX_TARGET_PROJECT_ID", "dst"),
            ("SHIFTBOX_TARGET_PRINCIPAL_EMAIL", "svc@dst"),
            ("SHIFTBOX_TARGET_PRIVATE_KEY", "line1\\nline2"),
        ]
        .into();
        let lookup = |name: &str| vars.get(name).map(|v| v.to_string());

        let target = credentials_from_env(lookup, "TARGET").unwrap();
        assert_eq!(target.project_id, "dst");
        assert_eq!(target.private_key, "line1\nline2");

        assert!(credentials_from_env(lookup, "SOURCE").is_none());
    }

    #[test]
    fn test_partial_env_credentials_kept_for_validation() {
        let lookup = |name: &str| {
            (name == "SHIFTBOX_SOURCE_PROJECT_ID").then(|| "src".to_string())
        };

        let source = credentials_from_env(lookup, "SOURCE").unwrap();
        assert_eq!(source.project_id, "src");
        assert!(source.principal_email.is_empty());
    }
}
