use super::models::Config;
use crate::credentials::Credentials;
use crate::docstore::REFERENCE_BATCH_LIMIT;
use crate::transform::RecordTransform;
use thiserror::Error;

/// Smallest multipart part size accepted by common object stores
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;
const MAX_PAYLOAD_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("engine.batch_limit must be between 1 and {max}, got {actual}")]
    BatchLimitOutOfRange { actual: usize, max: usize },

    #[error("engine.{field} must be at least 1")]
    ZeroConcurrency { field: &'static str },

    #[error("engine.operation_timeout_secs must be positive")]
    ZeroOperationTimeout,

    #[error("engine.part_size ({actual}) is below the {limit} byte minimum")]
    PartSizeTooSmall { actual: u64, limit: u64 },

    #[error("jobs.retention_secs must be positive")]
    ZeroRetention,

    #[error("max_payload_bytes ({actual}) exceeds limit of 5MB ({limit})")]
    PayloadSizeExceedsLimit { actual: u64, limit: u64 },

    #[error("Transform for collection '{collection}' has an empty {field}")]
    EmptyTransformField {
        collection: String,
        field: &'static str,
    },

    #[error("Transform for collection '{collection}' reuses field name '{field}'")]
    DuplicateTransformField { collection: String, field: String },

    #[error("Invalid collection name in transforms: '{0}'")]
    InvalidCollectionName(String),

    #[error("{side} credentials from environment are incomplete")]
    IncompleteCredentials { side: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_engine(config)?;
    validate_payload_size(config)?;
    if config.jobs.retention_secs == 0 {
        return Err(ValidationError::ZeroRetention);
    }
    validate_transforms(config)?;
    validate_credentials(config)?;
    Ok(())
}

fn validate_engine(config: &Config) -> Result<(), ValidationError> {
    let engine = &config.engine;

    if engine.batch_limit == 0 || engine.batch_limit > REFERENCE_BATCH_LIMIT {
        return Err(ValidationError::BatchLimitOutOfRange {
            actual: engine.batch_limit,
            max: REFERENCE_BATCH_LIMIT,
        });
    }

    if engine.write_concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency {
            field: "write_concurrency",
        });
    }

    if engine.blob_concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency {
            field: "blob_concurrency",
        });
    }

    if engine.operation_timeout_secs == 0 {
        return Err(ValidationError::ZeroOperationTimeout);
    }

    if engine.part_size.as_u64() < MIN_PART_SIZE {
        return Err(ValidationError::PartSizeTooSmall {
            actual: engine.part_size.as_u64(),
            limit: MIN_PART_SIZE,
        });
    }

    Ok(())
}

fn validate_payload_size(config: &Config) -> Result<(), ValidationError> {
    let actual = config.server.api.max_payload_bytes.as_u64();
    if actual > MAX_PAYLOAD_BYTES {
        return Err(ValidationError::PayloadSizeExceedsLimit {
            actual,
            limit: MAX_PAYLOAD_BYTES,
        });
    }

    Ok(())
}

/// Transform field names must be non-empty and pairwise distinct
fn validate_transforms(config: &Config) -> Result<(), ValidationError> {
    for (collection, transform) in &config.transforms {
        if collection.trim().is_empty() || collection.contains('/') {
            return Err(ValidationError::InvalidCollectionName(collection.clone()));
        }

        let RecordTransform::CredentialHashing(hashing) = transform else {
            continue;
        };

        let fields = [
            ("password_field", &hashing.password_field),
            ("salt_field", &hashing.salt_field),
            ("hash_field", &hashing.hash_field),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyTransformField {
                    collection: collection.clone(),
                    field: name,
                });
            }
        }

        for (i, (_, a)) in fields.iter().enumerate() {
            if fields[i + 1..].iter().any(|(_, b)| a == b) {
                return Err(ValidationError::DuplicateTransformField {
                    collection: collection.clone(),
                    field: a.to_string(),
                });
            }
        }
    }

    Ok(())
}

fn validate_credentials(config: &Config) -> Result<(), ValidationError> {
    let sides = [
        ("source", config.credentials.source.as_ref()),
        ("target", config.credentials.target.as_ref()),
    ];

    for (side, creds) in sides {
        if creds.is_some_and(is_partial) {
            return Err(ValidationError::IncompleteCredentials { side });
        }
    }

    Ok(())
}

fn is_partial(creds: &Credentials) -> bool {
    let filled = [
        &creds.project_id,
        &creds.principal_email,
        &creds.private_key,
    ]
    .iter()
    .filter(|v| !v.trim().is_empty())
    .count();

    filled != 0 && filled != 3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;
    use crate::transform::CredentialHashing;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_batch_limit_bounds() {
        let mut config = Config::default();
        config.engine.batch_limit = 501;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::BatchLimitOutOfRange { actual: 501, max: 500 })
        ));

        config.engine.batch_limit = 0;
        assert!(validate(&config).is_err());

        config.engine.batch_limit = 100;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_concurrency() {
        let mut config = Config::default();
        config.engine.blob_concurrency = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroConcurrency {
                field: "blob_concurrency"
            })
        ));
    }

    #[test]
    fn test_zero_timeout() {
        let mut config = Config::default();
        config.engine.operation_timeout_secs = 0;
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroOperationTimeout)
        ));
    }

    #[test]
    fn test_zero_retention() {
        let mut config = Config::default();
        config.jobs.retention_secs = 0;
        assert!(matches!(validate(&config), Err(ValidationError::ZeroRetention)));

        config.jobs.retention_secs = 600;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_part_size_minimum() {
        let mut config = Config::default();
        config.engine.part_size = ByteSize(1024);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::PartSizeTooSmall { .. })
        ));
    }

    #[test]
    fn test_payload_size_limit() {
        let mut config = Config::default();
        config.server.api.max_payload_bytes = ByteSize(10 * 1024 * 1024);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::PayloadSizeExceedsLimit { .. })
        ));
    }

    #[test]
    fn test_transform_fields_must_differ() {
        let mut config = Config::default();
        config.transforms.insert(
            "accounts".to_string(),
            RecordTransform::CredentialHashing(CredentialHashing {
                password_field: "password".to_string(),
                salt_field: "secret".to_string(),
                hash_field: "secret".to_string(),
            }),
        );

        assert!(matches!(
            validate(&config),
            Err(ValidationError::DuplicateTransformField { .. })
        ));
    }

    #[test]
    fn test_transform_fields_must_be_named() {
        let mut config = Config::default();
        config.transforms.insert(
            "accounts".to_string(),
            RecordTransform::CredentialHashing(CredentialHashing {
                password_field: " ".to_string(),
                ..CredentialHashing::default()
            }),
        );

        assert!(matches!(
            validate(&config),
            Err(ValidationError::EmptyTransformField {
                field: "password_field",
                ..
            })
        ));
    }

    #[test]
    fn test_partial_env_credentials_rejected() {
        let mut config = Config::default();
        config.credentials.target = Some(Credentials::new("dst", "", ""));
        assert!(matches!(
            validate(&config),
            Err(ValidationError::IncompleteCredentials { side: "target" })
        ));

        config.credentials.target = Some(Credentials::new("dst", "svc@dst", "key"));
        assert!(validate(&config).is_ok());
    }
}
