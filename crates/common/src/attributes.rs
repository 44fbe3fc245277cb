//! Selected product attributes (size, colour, ...) attached to a cart line.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Attribute key that selects the inventory variant of a product.
pub const SIZE_ATTRIBUTE: &str = "size";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("Attribute key must not be empty")]
    EmptyKey,
}

/// Normalized, ordered set of `(key, value)` pairs.
///
/// Keys are trimmed and lower-cased, values trimmed. Two sets that differ only
/// in insertion order or key casing are equal and share the same
/// [`AttributeSet::canonical_key`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeSet(BTreeMap<String, String>);

impl AttributeSet {
    /// Creates an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from raw pairs, normalizing each entry.
    ///
    /// A later duplicate key overwrites an earlier one.
    pub fn from_pairs<K, V, I>(pairs: I) -> Result<Self, AttributeError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut set = Self::new();
        for (key, value) in pairs {
            set.insert(key.as_ref(), value.as_ref())?;
        }
        Ok(set)
    }

    /// Inserts a single normalized pair.
    pub fn insert(&mut self, key: &str, value: &str) -> Result<(), AttributeError> {
        let key = key.trim().to_lowercase();
        if key.is_empty() {
            return Err(AttributeError::EmptyKey);
        }
        self.0.insert(key, value.trim().to_string());
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The selected size, if any.
    pub fn size(&self) -> Option<&str> {
        self.get(SIZE_ATTRIBUTE).filter(|size| !size.is_empty())
    }

    /// Stable textual form used for line matching and the storage unique key.
    ///
    /// Each key and value is written with Rust string escaping, so separators
    /// inside values cannot make two different sets collide.
    pub fn canonical_key(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k:?}={v:?}"))
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_and_case_do_not_matter() {
        let a = AttributeSet::from_pairs([("Size", "M"), ("color", "red")]).unwrap();
        let b = AttributeSet::from_pairs([("color", " red "), ("size", "M")]).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn different_values_have_different_keys() {
        let a = AttributeSet::from_pairs([("size", "M")]).unwrap();
        let b = AttributeSet::from_pairs([("size", "L")]).unwrap();
        assert_ne!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn separators_inside_values_do_not_collide() {
        let a = AttributeSet::from_pairs([("a", "1;b=2")]).unwrap();
        let b = AttributeSet::from_pairs([("a", "1"), ("b", "2")]).unwrap();
        assert_ne!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn empty_set_has_empty_key() {
        assert_eq!(AttributeSet::new().canonical_key(), "");
    }

    #[test]
    fn blank_key_is_rejected() {
        let result = AttributeSet::from_pairs([("  ", "x")]);
        assert_eq!(result, Err(AttributeError::EmptyKey));
    }

    #[test]
    fn size_lookup_ignores_blank_values() {
        let sized = AttributeSet::from_pairs([("SIZE", "XL")]).unwrap();
        assert_eq!(sized.size(), Some("XL"));

        let blank = AttributeSet::from_pairs([("size", " ")]).unwrap();
        assert_eq!(blank.size(), None);
    }

    #[test]
    fn serializes_as_plain_object() {
        let set = AttributeSet::from_pairs([("size", "M")]).unwrap();
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json, serde_json::json!({"size": "M"}));
    }
}
