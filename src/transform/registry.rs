use std::collections::BTreeMap;

use super::RecordTransform;

/// Registry mapping collection names to transforms
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformRegistry {
    transforms: BTreeMap<String, RecordTransform>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, collection: impl Into<String>, transform: RecordTransform) {
        self.transforms.insert(collection.into(), transform);
    }

    pub fn has_transform(&self, collection: &str) -> bool {
        self.transforms.contains_key(collection)
    }

    /// Transform used for every record of `collection`, resolved once per
    /// collection task. Unmapped collections get `Identity`.
    pub fn plan_for(&self, collection: &str) -> RecordTransform {
        self.transforms.get(collection).cloned().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordTransform)> {
        self.transforms.iter()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl FromIterator<(String, RecordTransform)> for TransformRegistry {
    fn from_iter<I: IntoIterator<Item = (String, RecordTransform)>>(iter: I) -> Self {
        Self {
            transforms: iter.into_iter().collect(),
        }
    }
}
