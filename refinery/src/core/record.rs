//! The invention disclosure record refined by every phase.
//!
//! A [`Record`] is a string-keyed JSON object. Phases only ever add or overwrite
//! keys through [`Record::merge`] and [`Record::set_field`]; neither removes a key
//! nor replaces a populated value with an empty one.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys every complete record carries.
pub const REQUIRED_FIELDS: [&str; 10] = [
    "invention_id",
    "invention_name",
    "technical_description",
    "problem_statement",
    "solution_approach",
    "key_technical_features",
    "statutory_category",
    "domain_classification",
    "inventor_keywords",
    "context",
];

/// Required keys whose values are lists of strings.
pub const LIST_FIELDS: [&str; 2] = ["key_technical_features", "inventor_keywords"];

/// Accepted values for `statutory_category`.
pub const STATUTORY_CATEGORIES: [&str; 4] =
    ["Process", "Machine", "Manufacture", "Composition of Matter"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON object. Anything else is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// String value of `key`, or `""` when missing or not a string.
    pub fn text(&self, key: &str) -> &str {
        self.0.get(key).and_then(Value::as_str).unwrap_or("")
    }

    /// String entries of a list field. Non-string entries are skipped.
    pub fn list(&self, key: &str) -> Vec<&str> {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Number of entries in a list field (0 when missing or not a list).
    pub fn list_len(&self, key: &str) -> usize {
        self.0
            .get(key)
            .and_then(Value::as_array)
            .map_or(0, Vec::len)
    }

    /// Merge `other` into `self`.
    ///
    /// Keys are inserted or overwritten, never removed. An empty incoming value
    /// does not replace a populated one.
    pub fn merge(&mut self, other: Record) {
        for (key, value) in other.0 {
            self.set_field(&key, value);
        }
    }

    /// Set a single field under the same rules as [`Record::merge`].
    ///
    /// Returns whether the stored value changed.
    pub fn set_field(&mut self, key: &str, value: Value) -> bool {
        let existing_populated = self.0.get(key).is_some_and(is_populated);
        if existing_populated && !is_populated(&value) {
            return false;
        }
        if value.is_null() && self.0.contains_key(key) {
            return false;
        }
        match self.0.get(key) {
            Some(current) if *current == value => false,
            _ => {
                self.0.insert(key.to_string(), value);
                true
            }
        }
    }

    /// Required fields absent from the record, in canonical order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|field| !self.0.contains_key(*field))
            .collect()
    }

    /// Count of keys holding a non-empty value.
    pub fn populated_fields(&self) -> usize {
        self.0.values().filter(|value| is_populated(value)).count()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
