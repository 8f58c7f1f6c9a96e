//! Item model for the partitioned key-value table.
//!
//! A row is addressed by a partition key and a sort key and carries a flat
//! map of named attributes. There is no schema beyond what each record type
//! declares in [`crate::schema`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute name of the partition key.
pub const PARTITION_KEY: &str = "pk";
/// Attribute name of the sort key.
pub const SORT_KEY: &str = "sk";

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    /// UTF-8 string.
    S(String),
    /// Signed integer.
    N(i64),
    /// Raw bytes.
    B(Vec<u8>),
    /// Boolean.
    Bool(bool),
}

impl AttributeValue {
    /// Borrow as a string, if this is an `S` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Read as an integer, if this is an `N` value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::N(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow as bytes, if this is a `B` value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::B(b) => Some(b),
            _ => None,
        }
    }

    /// Read as a boolean, if this is a `Bool` value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Short type tag for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Bool(_) => "BOOL",
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::S(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::S(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        Self::N(n)
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        Self::B(b)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Two-part row address.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Partition key.
    pub pk: String,
    /// Sort key.
    pub sk: String,
}

impl ItemKey {
    /// Create a key.
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.pk, self.sk)
    }
}

/// A row: its key plus named attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Partition key.
    pub pk: String,
    /// Sort key.
    pub sk: String,
    /// Non-key attributes.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Item {
    /// Create an item with no attributes.
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Create an empty item at `key`.
    pub fn at(key: ItemKey) -> Self {
        Self::new(key.pk, key.sk)
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Set an attribute, replacing any prior value.
    pub fn set(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Look up an attribute.
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// The row's address.
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.pk.clone(), self.sk.clone())
    }
}

/// Value predicate applied to query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Keep rows whose attribute equals one of the listed values.
    In {
        attribute: String,
        values: Vec<AttributeValue>,
    },
}

impl Filter {
    /// Keep rows whose `attribute` is one of `values`.
    pub fn one_of(attribute: &str, values: Vec<AttributeValue>) -> Self {
        Self::In {
            attribute: attribute.to_string(),
            values,
        }
    }

    /// Evaluate the predicate against an item.
    pub fn matches(&self, item: &Item) -> bool {
        match self {
            Self::In { attribute, values } => item
                .get(attribute)
                .is_some_and(|value| values.contains(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_in_matches_listed_values_only() {
        let filter = Filter::one_of("status", vec!["Queue".into(), "QueueNotNow".into()]);
        let queued = Item::new("queue#a", "1").with("status", "Queue");
        let done = Item::new("queue#a", "2").with("status", "QueueDone");
        let missing = Item::new("queue#a", "3");
        assert!(filter.matches(&queued));
        assert!(!filter.matches(&done));
        assert!(!filter.matches(&missing));
    }

    #[test]
    fn attribute_accessors_check_type() {
        let value = AttributeValue::N(3);
        assert_eq!(value.as_i64(), Some(3));
        assert_eq!(value.as_str(), None);
        assert_eq!(value.type_name(), "N");
    }
}
