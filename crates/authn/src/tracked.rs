//! Change-tracking key/value map used for token headers and payloads.
//!
//! [`ChangeTrackingMap`] wraps an ordered JSON object and remembers whether
//! any entry has been added, overwritten or removed since construction. The
//! [`Token`](crate::Token) uses the flag to decide whether a previously
//! encoded string can be reused or must be re-signed.
//!
//! Equality and serialization only look at the entries, never at the flag.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A JSON object that tracks whether it has been written to.
#[derive(Clone, Default)]
pub struct ChangeTrackingMap {
    entries: Map<String, Value>,
    modified: bool,
}

impl ChangeTrackingMap {
    /// Creates an empty, unmodified map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps existing entries. The result is unmodified.
    #[must_use]
    pub fn from_entries(entries: Map<String, Value>) -> Self {
        Self { entries, modified: false }
    }

    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the value stored under `key`, or `default` if absent.
    #[must_use]
    pub fn get_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.entries.get(key).unwrap_or(default)
    }

    /// Returns the string stored under `key`, if it is a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(Value::as_str)
    }

    /// Returns `true` if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Stores `value` under `key` and marks the map modified.
    ///
    /// Returns the previous value. The map is marked modified even when the
    /// new value equals the old one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.modified = true;
        self.entries.insert(key.into(), value.into())
    }

    /// Removes `key`, marking the map modified if it was present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let previous = self.entries.remove(key);
        if previous.is_some() {
            self.modified = true;
        }
        previous
    }

    /// Merges `values` into the map.
    ///
    /// An entry is written if `overwrite` is set or the key is absent. The map
    /// is marked modified only if at least one write happened. Returns the
    /// number of writes.
    pub fn merge_defaults<I, K>(&mut self, values: I, overwrite: bool) -> usize
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut writes = 0;
        for (key, value) in values {
            let key = key.into();
            if overwrite || !self.entries.contains_key(&key) {
                self.entries.insert(key, value);
                writes += 1;
            }
        }
        if writes > 0 {
            self.modified = true;
        }
        writes
    }

    /// Returns `true` if the map was written to since construction.
    #[must_use]
    pub fn modified(&self) -> bool {
        self.modified
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Borrows the underlying JSON object.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.entries
    }

    /// Consumes the map, returning its entries.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.entries
    }
}

impl PartialEq for ChangeTrackingMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for ChangeTrackingMap {}

impl PartialEq<Map<String, Value>> for ChangeTrackingMap {
    fn eq(&self, other: &Map<String, Value>) -> bool {
        &self.entries == other
    }
}

impl fmt::Debug for ChangeTrackingMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTrackingMap")
            .field("entries", &self.entries)
            .field("modified", &self.modified)
            .finish()
    }
}

impl From<Map<String, Value>> for ChangeTrackingMap {
    fn from(entries: Map<String, Value>) -> Self {
        Self::from_entries(entries)
    }
}

impl Serialize for ChangeTrackingMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChangeTrackingMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::deserialize(deserializer).map(Self::from_entries)
    }
}
