use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::TransformOutcome;
use crate::record::{FieldValue, Record};

/// Salt length in bytes (128 bits)
const SALT_LEN: usize = 16;

/// Replaces a plaintext password field with a salted SHA-256 hash
///
/// Only a string value counts as a plaintext password. Any other value
/// (null, number, map) leaves the record unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialHashing {
    #[serde(default = "default_password_field")]
    pub password_field: String,
    #[serde(default = "default_salt_field")]
    pub salt_field: String,
    #[serde(default = "default_hash_field")]
    pub hash_field: String,
}

fn default_password_field() -> String {
    "password".to_string()
}

fn default_salt_field() -> String {
    "passwordSalt".to_string()
}

fn default_hash_field() -> String {
    "passwordHash".to_string()
}

impl Default for CredentialHashing {
    fn default() -> Self {
        Self {
            password_field: default_password_field(),
            salt_field: default_salt_field(),
            hash_field: default_hash_field(),
        }
    }
}

impl CredentialHashing {
    pub fn apply(&self, mut record: Record) -> (Record, TransformOutcome) {
        let password = match record.get(&self.password_field).and_then(FieldValue::as_str) {
            Some(password) => password.to_string(),
            None => return (record, TransformOutcome::Unchanged),
        };

        let salt = generate_salt();
        let hash = hash_password(&password, &salt);

        record.fields.remove(&self.password_field);
        record
            .fields
            .insert(self.salt_field.clone(), FieldValue::String(salt));
        record
            .fields
            .insert(self.hash_field.clone(), FieldValue::String(hash));

        (record, TransformOutcome::SecurityConverted)
    }
}

/// Fresh 128-bit random salt, lower-case hex
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// `hex(SHA-256(password || salt))` over the UTF-8 bytes of both strings
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, hash: &str) -> bool {
    hash_password(password, salt) == hash
}
