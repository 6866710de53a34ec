//! Critical selector sets and where they come from
//!
//! The set of selectors matching above-the-fold elements is discovered
//! elsewhere (a client-side beacon) and only ever read here, apart from
//! [`write_critical_selectors`] which records a new snapshot.

use log::{debug, warn};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::error::StoreResult;
use crate::store::{PropertyKey, PropertyStore};

/// Immutable snapshot of the critical selectors for a page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalSelectorSet {
    selectors: FxHashSet<String>,
    /// Version of this snapshot; bumped on every write
    signature: u64,
}

impl CriticalSelectorSet {
    pub fn new<I, S>(selectors: I, signature: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            signature,
        }
    }

    pub fn signature(&self) -> u64 {
        self.signature
    }

    pub fn contains(&self, selector: &str) -> bool {
        self.selectors.contains(selector)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.selectors.iter().map(String::as_str)
    }

    /// Selectors in sorted order; the canonical form used for fingerprints
    pub fn sorted(&self) -> Vec<&str> {
        let mut sorted: Vec<&str> = self.iter().collect();
        sorted.sort_unstable();
        sorted
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }
}

/// Supplies the current critical selector set for a page
pub trait SelectorSetSource {
    /// `None` when no set is known or it cannot be read
    fn critical_selectors(&self, page: &str, cohort: &str) -> Option<CriticalSelectorSet>;
}

/// A fixed set, the same for every page
#[derive(Debug, Clone, Default)]
pub struct StaticSelectorSource {
    set: CriticalSelectorSet,
}

impl StaticSelectorSource {
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            set: CriticalSelectorSet::new(selectors, 0),
        }
    }
}

impl SelectorSetSource for StaticSelectorSource {
    fn critical_selectors(&self, _page: &str, _cohort: &str) -> Option<CriticalSelectorSet> {
        Some(self.set.clone())
    }
}

/// Reads the set persisted in the property store
pub struct StoredSelectorSource<'a> {
    store: &'a dyn PropertyStore,
    property: String,
}

impl<'a> StoredSelectorSource<'a> {
    pub fn new(store: &'a dyn PropertyStore, config: &FilterConfig) -> Self {
        Self {
            store,
            property: config.selectors_property.clone(),
        }
    }
}

impl SelectorSetSource for StoredSelectorSource<'_> {
    fn critical_selectors(&self, page: &str, cohort: &str) -> Option<CriticalSelectorSet> {
        let key = PropertyKey::new(page, cohort, &self.property);
        match read_selector_set(self.store, &key) {
            Ok(Some(set)) => Some(set),
            Ok(None) => {
                debug!("No critical selectors stored for {}", key);
                None
            }
            Err(e) => {
                warn!("Failed to read critical selectors for {}: {}", key, e);
                None
            }
        }
    }
}

fn read_selector_set(store: &dyn PropertyStore, key: &PropertyKey) -> StoreResult<Option<CriticalSelectorSet>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Persist a new critical selector set for `page`, replacing any previous
/// snapshot and bumping its signature
pub fn write_critical_selectors<I, S>(
    store: &dyn PropertyStore,
    config: &FilterConfig,
    page: &str,
    selectors: I,
) -> StoreResult<CriticalSelectorSet>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let key = PropertyKey::new(page, &config.beacon_cohort, &config.selectors_property);
    // An unreadable previous snapshot restarts the numbering
    let previous = read_selector_set(store, &key).ok().flatten();
    let signature = previous.map(|set| set.signature + 1).unwrap_or(1);

    let set = CriticalSelectorSet::new(selectors, signature);
    store.set(&key, serde_json::to_vec(&set)?)?;
    debug!("Wrote {} critical selectors for {} (signature {})", set.len(), page, signature);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const PAGE: &str = "http://www.example.com/";

    #[test]
    fn test_sorted_is_canonical() {
        let a = CriticalSelectorSet::new(["span", "div", "*"], 1);
        let b = CriticalSelectorSet::new(["*", "span", "div"], 7);
        assert_eq!(a.sorted(), vec!["*", "div", "span"]);
        assert_eq!(a.sorted(), b.sorted());
    }

    #[test]
    fn test_static_source() {
        let source = StaticSelectorSource::new(["div"]);
        let set = source.critical_selectors(PAGE, "beacon").unwrap();
        assert!(set.contains("div"));
        assert!(!set.contains("span"));
    }

    #[test]
    fn test_write_then_read() {
        let store = MemoryStore::new();
        let config = FilterConfig::default();
        write_critical_selectors(&store, &config, PAGE, ["div", "*"]).unwrap();

        let source = StoredSelectorSource::new(&store, &config);
        let set = source.critical_selectors(PAGE, &config.beacon_cohort).unwrap();
        assert_eq!(set.sorted(), vec!["*", "div"]);
        assert_eq!(set.signature(), 1);
    }

    #[test]
    fn test_rewrite_bumps_signature() {
        let store = MemoryStore::new();
        let config = FilterConfig::default();
        write_critical_selectors(&store, &config, PAGE, ["div"]).unwrap();
        let set = write_critical_selectors(&store, &config, PAGE, ["span"]).unwrap();
        assert_eq!(set.signature(), 2);
        assert!(!set.contains("div"));
    }

    #[test]
    fn test_missing_and_corrupt_sets() {
        let store = MemoryStore::new();
        let config = FilterConfig::default();
        let source = StoredSelectorSource::new(&store, &config);
        assert!(source.critical_selectors(PAGE, "beacon").is_none());

        let key = PropertyKey::new(PAGE, "beacon", "critical_selectors");
        store.set(&key, b"not json".to_vec()).unwrap();
        assert!(source.critical_selectors(PAGE, "beacon").is_none());
    }
}
