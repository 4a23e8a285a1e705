//! Per-collection record transforms
//!
//! Records pass through exactly one transform on their way from the source
//! to the target. The set of transforms is closed:
//!
//! - [`RecordTransform::Identity`] - record is written as read
//! - [`RecordTransform::CredentialHashing`] - a plaintext password field is
//!   replaced by a random salt and a SHA-256 hash
//!
//! [`TransformRegistry`] maps collection names to transforms. Collections
//! without an entry use `Identity`.
//!
//! ## Example
//!
//! ```rust
//! use shiftbox::record::Record;
//! use shiftbox::transform::{CredentialHashing, RecordTransform, TransformOutcome, TransformRegistry};
//!
//! let mut registry = TransformRegistry::new();
//! registry.register("accounts", RecordTransform::CredentialHashing(CredentialHashing::default()));
//!
//! let plan = registry.plan_for("accounts");
//! let (record, outcome) = plan.apply(Record::new("a1").with_field("password", "secret123"));
//! assert_eq!(outcome, TransformOutcome::SecurityConverted);
//! assert!(record.get("password").is_none());
//! ```

mod credential;
mod registry;

pub use credential::{CredentialHashing, generate_salt, hash_password, verify_password};
pub use registry::TransformRegistry;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// What a transform did to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOutcome {
    Unchanged,
    SecurityConverted,
}

/// Transform applied to every record of a collection
///
/// Deserializes from config tables such as
/// `[transforms.accounts] kind = "credential_hashing"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordTransform {
    #[default]
    Identity,
    CredentialHashing(CredentialHashing),
}

impl RecordTransform {
    /// Apply the transform. Pure apart from salt generation.
    pub fn apply(&self, record: Record) -> (Record, TransformOutcome) {
        match self {
            Self::Identity => (record, TransformOutcome::Unchanged),
            Self::CredentialHashing(hashing) => hashing.apply(record),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::CredentialHashing(_) => "credential_hashing",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    #[test]
    fn test_identity_leaves_record_untouched() {
        let record = Record::new("o1")
            .with_field("password", "visible")
            .with_field("total", 3i64);

        let (out, outcome) = RecordTransform::Identity.apply(record.clone());
        assert_eq!(outcome, TransformOutcome::Unchanged);
        assert_eq!(out, record);
    }

    #[test]
    fn test_deserialize_from_toml_table() {
        let identity: RecordTransform = toml::from_str(r#"kind = "identity""#).unwrap();
        assert_eq!(identity, RecordTransform::Identity);

        let hashing: RecordTransform = toml::from_str(
            r#"
kind = "credential_hashing"
password_field = "pwd"
"#,
        )
        .unwrap();

        match hashing {
            RecordTransform::CredentialHashing(h) => {
                assert_eq!(h.password_field, "pwd");
                assert_eq!(h.salt_field, "passwordSalt");
                assert_eq!(h.hash_field, "passwordHash");
            }
            other => panic!("unexpected transform: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let result: Result<RecordTransform, _> = toml::from_str(r#"kind = "rot13""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_dispatch_to_hashing() {
        let transform = RecordTransform::CredentialHashing(CredentialHashing::default());
        let (out, outcome) = transform.apply(Record::new("a1").with_field("password", "pw"));

        assert_eq!(outcome, TransformOutcome::SecurityConverted);
        assert!(matches!(out.get("passwordHash"), Some(FieldValue::String(_))));
        assert_eq!(transform.name(), "credential_hashing");
    }
}
