//! Credential resolution for source and target projects
//!
//! A job carries either an explicit `(project_id, principal_email,
//! private_key)` triple or nothing at all, in which case the ambient
//! environment supplies the project and authentication is deferred to the
//! runtime. Resolution is pure validation; nothing here talks to a backend.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use thiserror::Error;

/// Environment variables consulted for the ambient project id, in order
pub const DEFAULT_AMBIENT_PROJECT_VARS: &[&str] = &["GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("explicit credentials are incomplete, missing: {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    #[error("no explicit credentials supplied and no ambient project id found (checked {checked})")]
    NoAmbientProject { checked: String },
}

/// Explicit service credentials for one project
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub project_id: String,
    #[serde(default, alias = "client_email")]
    pub principal_email: String,
    #[serde(default, skip_serializing)]
    pub private_key: String,
}

impl Credentials {
    pub fn new(
        project_id: impl Into<String>,
        principal_email: impl Into<String>,
        private_key: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            principal_email: principal_email.into(),
            private_key: private_key.into(),
        }
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.project_id.trim().is_empty() {
            missing.push("project_id");
        }
        if self.principal_email.trim().is_empty() {
            missing.push("principal_email");
        }
        if self.private_key.trim().is_empty() {
            missing.push("private_key");
        }
        missing
    }

    fn is_blank(&self) -> bool {
        self.missing_fields().len() == 3
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("project_id", &self.project_id)
            .field("principal_email", &self.principal_email)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Credentials after validation
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedCredentials {
    Explicit(Credentials),
    Ambient { project_id: String },
}

impl ResolvedCredentials {
    pub fn project_id(&self) -> &str {
        match self {
            ResolvedCredentials::Explicit(creds) => &creds.project_id,
            ResolvedCredentials::Ambient { project_id } => project_id,
        }
    }

    pub fn is_ambient(&self) -> bool {
        matches!(self, ResolvedCredentials::Ambient { .. })
    }
}

impl fmt::Debug for ResolvedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedCredentials::Explicit(creds) => f.debug_tuple("Explicit").field(creds).finish(),
            ResolvedCredentials::Ambient { project_id } => f
                .debug_struct("Ambient")
                .field("project_id", project_id)
                .finish(),
        }
    }
}

/// Validates explicit credentials or falls back to the ambient project
#[derive(Debug, Clone, Default)]
pub struct CredentialsResolver {
    ambient_project_id: Option<String>,
    checked_vars: Vec<String>,
}

impl CredentialsResolver {
    /// Resolver with a fixed ambient project (or none)
    pub fn new(ambient_project_id: Option<String>) -> Self {
        Self {
            ambient_project_id: ambient_project_id
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
            checked_vars: Vec::new(),
        }
    }

    /// Resolver reading the ambient project from the given environment variables
    pub fn from_env<S: AsRef<str>>(vars: &[S]) -> Self {
        let ambient = vars
            .iter()
            .filter_map(|name| env::var(name.as_ref()).ok())
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty());

        Self {
            ambient_project_id: ambient,
            checked_vars: vars.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    pub fn ambient_project_id(&self) -> Option<&str> {
        self.ambient_project_id.as_deref()
    }

    /// Resolve an optional explicit triple.
    ///
    /// A triple with every field blank is treated the same as no triple. A
    /// partially filled triple is rejected instead of silently falling back
    /// to ambient credentials.
    pub fn resolve(
        &self,
        explicit: Option<&Credentials>,
    ) -> Result<ResolvedCredentials, CredentialsError> {
        match explicit {
            Some(creds) if !creds.is_blank() => {
                let missing = creds.missing_fields();
                if !missing.is_empty() {
                    return Err(CredentialsError::Incomplete { missing });
                }

                Ok(ResolvedCredentials::Explicit(Credentials {
                    project_id: creds.project_id.trim().to_string(),
                    principal_email: creds.principal_email.trim().to_string(),
                    private_key: creds.private_key.clone(),
                }))
            }
            _ => self.resolve_ambient(),
        }
    }

    /// Resolve credentials that must be explicit (the migration target)
    pub fn resolve_explicit(
        &self,
        creds: &Credentials,
    ) -> Result<ResolvedCredentials, CredentialsError> {
        let missing = creds.missing_fields();
        if !missing.is_empty() {
            return Err(CredentialsError::Incomplete { missing });
        }
        self.resolve(Some(creds))
    }

    fn resolve_ambient(&self) -> Result<ResolvedCredentials, CredentialsError> {
        match &self.ambient_project_id {
            Some(project_id) => Ok(ResolvedCredentials::Ambient {
                project_id: project_id.clone(),
            }),
            None => Err(CredentialsError::NoAmbientProject {
                checked: if self.checked_vars.is_empty() {
                    "no environment variables".to_string()
                } else {
                    self.checked_vars.join(", ")
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> Credentials {
        Credentials::new("proj-a", "svc@proj-a.iam", "-----BEGIN KEY-----")
    }

    #[test]
    fn test_explicit_returned_verbatim() {
        let resolver = CredentialsResolver::new(None);
        let resolved = resolver.resolve(Some(&full())).unwrap();

        assert_eq!(resolved, ResolvedCredentials::Explicit(full()));
        assert_eq!(resolved.project_id(), "proj-a");
    }

    #[test]
    fn test_partial_credentials_rejected() {
        let resolver = CredentialsResolver::new(Some("ambient".to_string()));
        let mut creds = full();
        creds.private_key = String::new();

        let err = resolver.resolve(Some(&creds)).unwrap_err();
        assert_eq!(
            err,
            CredentialsError::Incomplete {
                missing: vec!["private_key"]
            }
        );
    }

    #[test]
    fn test_absent_uses_ambient() {
        let resolver = CredentialsResolver::new(Some("ambient-proj".to_string()));
        let resolved = resolver.resolve(None).unwrap();

        assert!(resolved.is_ambient());
        assert_eq!(resolved.project_id(), "ambient-proj");
    }

    #[test]
    fn test_blank_triple_counts_as_absent() {
        let resolver = CredentialsResolver::new(Some("ambient-proj".to_string()));
        let blank = Credentials::new(" ", "", "");

        assert!(resolver.resolve(Some(&blank)).unwrap().is_ambient());
    }

    #[test]
    fn test_no_ambient_project() {
        let resolver = CredentialsResolver::new(None);
        assert!(matches!(
            resolver.resolve(None),
            Err(CredentialsError::NoAmbientProject { .. })
        ));
    }

    #[test]
    fn test_target_must_be_explicit() {
        let resolver = CredentialsResolver::new(Some("ambient-proj".to_string()));
        let err = resolver.resolve_explicit(&Credentials::default()).unwrap_err();
        assert!(matches!(err, CredentialsError::Incomplete { missing } if missing.len() == 3));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let rendered = format!("{:?}", full());
        assert!(!rendered.contains("BEGIN KEY"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_private_key_never_serialized() {
        let json = serde_json::to_string(&full()).unwrap();
        assert!(!json.contains("private_key"));
    }
}
