//! Property store
//!
//! The filter persists two things per page: the critical selector set and
//! the computed critical CSS. Both live behind [`PropertyStore`], which only
//! promises whole-value get/set per key; the last writer wins.

use std::fmt;
use std::sync::RwLock;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Identifies one stored value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey {
    /// Page identity (normally the page URL)
    pub page: String,
    /// Named partition of properties sharing a lifecycle
    pub cohort: String,
    pub property: String,
}

impl PropertyKey {
    pub fn new(page: impl Into<String>, cohort: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            cohort: cohort.into(),
            property: property.into(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}/{}]", self.page, self.cohort, self.property)
    }
}

/// Storage backend for per-page properties
pub trait PropertyStore: Send + Sync {
    /// Read a value; `Ok(None)` if it was never written or was deleted
    fn get(&self, key: &PropertyKey) -> StoreResult<Option<Vec<u8>>>;

    /// Replace a value
    fn set(&self, key: &PropertyKey, value: Vec<u8>) -> StoreResult<()>;

    /// Remove a value; removing a missing value is not an error
    fn delete(&self, key: &PropertyKey) -> StoreResult<()>;
}

/// In-memory property store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<FxHashMap<PropertyKey, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given values
    pub fn from_entries(entries: impl IntoIterator<Item = (PropertyKey, Vec<u8>)>) -> Self {
        Self {
            values: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Snapshot of every stored value, sorted by key
    pub fn entries(&self) -> StoreResult<Vec<(PropertyKey, Vec<u8>)>> {
        let values = self.values.read().map_err(|_| poisoned())?;
        let mut entries: Vec<_> = values.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }

    pub fn len(&self) -> usize {
        self.values.read().map(|values| values.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("lock poisoned".to_string())
}

impl PropertyStore for MemoryStore {
    fn get(&self, key: &PropertyKey) -> StoreResult<Option<Vec<u8>>> {
        let values = self.values.read().map_err(|_| poisoned())?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &PropertyKey, value: Vec<u8>) -> StoreResult<()> {
        let mut values = self.values.write().map_err(|_| poisoned())?;
        values.insert(key.clone(), value);
        Ok(())
    }

    fn delete(&self, key: &PropertyKey) -> StoreResult<()> {
        let mut values = self.values.write().map_err(|_| poisoned())?;
        values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(property: &str) -> PropertyKey {
        PropertyKey::new("http://www.example.com/", "dom", property)
    }

    #[test]
    fn test_get_missing() {
        let store = MemoryStore::new();
        assert_eq!(store.get(&key("a")).unwrap(), None);
    }

    #[test]
    fn test_set_replaces_whole_value() {
        let store = MemoryStore::new();
        store.set(&key("a"), b"first".to_vec()).unwrap();
        store.set(&key("a"), b"second".to_vec()).unwrap();
        assert_eq!(store.get(&key("a")).unwrap(), Some(b"second".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_keys_are_distinct_per_part() {
        let store = MemoryStore::new();
        store.set(&PropertyKey::new("p1", "dom", "x"), vec![1]).unwrap();
        store.set(&PropertyKey::new("p2", "dom", "x"), vec![2]).unwrap();
        store.set(&PropertyKey::new("p1", "beacon", "x"), vec![3]).unwrap();
        assert_eq!(store.get(&PropertyKey::new("p1", "dom", "x")).unwrap(), Some(vec![1]));
        assert_eq!(store.get(&PropertyKey::new("p2", "dom", "x")).unwrap(), Some(vec![2]));
        assert_eq!(store.get(&PropertyKey::new("p1", "beacon", "x")).unwrap(), Some(vec![3]));
    }

    #[test]
    fn test_delete() {
        let store = MemoryStore::new();
        store.set(&key("a"), vec![1]).unwrap();
        store.delete(&key("a")).unwrap();
        store.delete(&key("a")).unwrap();
        assert_eq!(store.get(&key("a")).unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_entries_roundtrip() {
        let store = MemoryStore::new();
        store.set(&key("b"), vec![2]).unwrap();
        store.set(&key("a"), vec![1]).unwrap();
        let entries = store.entries().unwrap();
        assert_eq!(entries[0].0.property, "a");

        let copy = MemoryStore::from_entries(entries);
        assert_eq!(copy.get(&key("b")).unwrap(), Some(vec![2]));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key("x").to_string(), "http://www.example.com/ [dom/x]");
    }
}
