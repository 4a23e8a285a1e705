use std::collections::HashSet;
use thiserror::Error;

use super::models::JobRequest;
use crate::config::CredentialsConfig;
use crate::docstore::keys::is_valid_collection_name;
use crate::migration::MigrationJobSpec;

const MAX_SELECTED_COLLECTIONS: usize = 1000;
const MAX_SELECTED_PREFIXES: usize = 1000;
const MAX_PREFIX_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum JobRequestValidationError {
    #[error("selected_collections must contain at most 1000 entries")]
    TooManyCollections,
    #[error("selected_blob_prefixes must contain at most 1000 entries")]
    TooManyPrefixes,
    #[error("collection name '{0}' is not valid")]
    InvalidCollectionName(String),
    #[error("collection '{0}' is selected more than once")]
    DuplicateCollection(String),
    #[error("blob prefix exceeds 1024 bytes")]
    PrefixTooLong,
    #[error("blob prefix '{0}' contains a control character")]
    InvalidPrefix(String),
    #[error("target_credentials are required")]
    MissingTarget,
}

/// Shape checks on a job request. Semantic checks (credentials, empty
/// selection, same project) belong to the orchestrator.
pub fn validate_job_request(request: &JobRequest) -> Result<(), JobRequestValidationError> {
    if request.selected_collections.len() > MAX_SELECTED_COLLECTIONS {
        return Err(JobRequestValidationError::TooManyCollections);
    }

    if request.selected_blob_prefixes.len() > MAX_SELECTED_PREFIXES {
        return Err(JobRequestValidationError::TooManyPrefixes);
    }

    let mut seen = HashSet::new();
    for name in &request.selected_collections {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        if !is_valid_collection_name(name) {
            return Err(JobRequestValidationError::InvalidCollectionName(
                name.to_string(),
            ));
        }

        if !seen.insert(name) {
            return Err(JobRequestValidationError::DuplicateCollection(
                name.to_string(),
            ));
        }
    }

    for prefix in &request.selected_blob_prefixes {
        if prefix.len() > MAX_PREFIX_LEN {
            return Err(JobRequestValidationError::PrefixTooLong);
        }

        if prefix.chars().any(char::is_control) {
            return Err(JobRequestValidationError::InvalidPrefix(prefix.clone()));
        }
    }

    Ok(())
}

/// Fill absent credentials from the server's configured defaults
pub fn into_job_spec(
    request: JobRequest,
    defaults: &CredentialsConfig,
) -> Result<MigrationJobSpec, JobRequestValidationError> {
    let target_credentials = request
        .target_credentials
        .or_else(|| defaults.target.clone())
        .ok_or(JobRequestValidationError::MissingTarget)?;

    Ok(MigrationJobSpec {
        source_credentials: request
            .source_credentials
            .or_else(|| defaults.source.clone()),
        target_credentials,
        selected_collections: request.selected_collections,
        migrate_all_collections: request.migrate_all_collections,
        selected_blob_prefixes: request.selected_blob_prefixes,
        migrate_all_blob_prefixes: request.migrate_all_blob_prefixes,
        include_blob_migration: request.include_blob_migration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credentials;

    #[test]
    fn validate_job_request_accepts_valid_payload() {
        let request = sample_request();
        assert!(validate_job_request(&request).is_ok());
    }

    #[test]
    fn validate_job_request_rejects_bad_collection_name() {
        let mut request = sample_request();
        request.selected_collections.push("users/archive".to_string());

        let err = validate_job_request(&request).unwrap_err();
        assert!(matches!(
            err,
            JobRequestValidationError::InvalidCollectionName(_)
        ));
    }

    #[test]
    fn validate_job_request_rejects_duplicates() {
        let mut request = sample_request();
        request.selected_collections.push(" orders ".to_string());

        let err = validate_job_request(&request).unwrap_err();
        assert!(matches!(err, JobRequestValidationError::DuplicateCollection(_)));
    }

    #[test]
    fn validate_job_request_limits_prefixes() {
        let mut request = sample_request();
        request.selected_blob_prefixes = vec!["p".to_string(); MAX_SELECTED_PREFIXES + 1];

        let err = validate_job_request(&request).unwrap_err();
        assert!(matches!(err, JobRequestValidationError::TooManyPrefixes));
    }

    #[test]
    fn into_job_spec_uses_configured_defaults() {
        let defaults = CredentialsConfig {
            source: Some(Credentials::new("src", "svc@src", "key")),
            target: Some(Credentials::new("dst", "svc@dst", "key")),
            ..CredentialsConfig::default()
        };

        let spec = into_job_spec(sample_request(), &defaults).unwrap();
        assert_eq!(spec.target_credentials.project_id, "dst");
        assert_eq!(spec.source_credentials.unwrap().project_id, "src");
    }

    #[test]
    fn into_job_spec_requires_a_target() {
        let err = into_job_spec(sample_request(), &CredentialsConfig::default()).unwrap_err();
        assert!(matches!(err, JobRequestValidationError::MissingTarget));
    }

    #[test]
    fn shipped_job_file_parses() {
        let raw = std::fs::read_to_string("jobs/accounts-and-orders.toml").unwrap();
        let request: JobRequest = toml::from_str(&raw).unwrap();

        assert!(validate_job_request(&request).is_ok());
        assert!(request.source_credentials.is_none());
        assert_eq!(request.selected_blob_prefixes, vec!["avatars".to_string()]);
    }

    fn sample_request() -> JobRequest {
        JobRequest {
            selected_collections: vec!["accounts".to_string(), "orders".to_string()],
            selected_blob_prefixes: vec!["avatars".to_string()],
            include_blob_migration: true,
            ..JobRequest::default()
        }
    }
}
