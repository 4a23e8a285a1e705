//! Schemaless document records
//!
//! Records are identified key-value bags. The id is stable between source and
//! target projects, so every write is an upsert keyed by it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Fields = BTreeMap<String, FieldValue>;

/// Dynamically-typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Array(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// A single document in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    /// Builder-style field setter, mostly useful in tests and fixtures
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Merge `incoming` into this record: incoming fields overwrite, fields
    /// missing from `incoming` are kept.
    pub fn merge_from(&mut self, incoming: Fields) {
        self.fields.extend(incoming);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_target_only_fields() {
        let mut target = Record::new("u1")
            .with_field("name", "old")
            .with_field("legacy", true);
        let source = Record::new("u1").with_field("name", "new");

        target.merge_from(source.fields);

        assert_eq!(target.get("name"), Some(&FieldValue::from("new")));
        assert_eq!(target.get("legacy"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_field_value_json_shape() {
        let json = r#"{"id":"a","fields":{"n":1,"f":1.5,"s":"x","z":null,"l":[1,"two"],"m":{"k":false}}}"#;
        let record: Record = serde_json::from_str(json).unwrap();

        assert_eq!(record.get("n"), Some(&FieldValue::Integer(1)));
        assert_eq!(record.get("f"), Some(&FieldValue::Double(1.5)));
        assert_eq!(record.get("z"), Some(&FieldValue::Null));
        assert!(matches!(record.get("l"), Some(FieldValue::Array(items)) if items.len() == 2));
        assert!(matches!(record.get("m"), Some(FieldValue::Map(_))));
    }
}
