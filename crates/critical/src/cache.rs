//! Result cache
//!
//! Critical CSS is only ever shown when a stored entry was computed from
//! exactly the CSS and selector set in effect now. On a miss the result is
//! computed and stored, but the page is left alone until a later request
//! finds the matching entry.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::StoreResult;
use crate::selectors::CriticalSelectorSet;
use crate::store::{PropertyKey, PropertyStore};

/// One stylesheet source as it contributes to a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssSource {
    pub css: String,
    /// `media` attribute of the node that carried the CSS
    pub media: Option<String>,
    /// URL of a linked stylesheet; relative references in it resolve here
    pub base: Option<Url>,
}

impl CssSource {
    pub fn new(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            media: None,
            base: None,
        }
    }

    pub fn with_media(css: impl Into<String>, media: Option<String>) -> Self {
        Self {
            css: css.into(),
            media,
            base: None,
        }
    }

    pub fn with_base(mut self, base: Url) -> Self {
        self.base = Some(base);
        self
    }
}

/// Persisted critical CSS with the fingerprints it was computed from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub css_fingerprint: String,
    pub selector_fingerprint: String,
    pub critical_css: String,
}

impl CacheEntry {
    /// Valid only for exactly these fingerprints
    pub fn matches(&self, css_fingerprint: &str, selector_fingerprint: &str) -> bool {
        self.css_fingerprint == css_fingerprint && self.selector_fingerprint == selector_fingerprint
    }
}

/// Lowercase hex SHA-256 of `bytes`
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn update_framed(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Fingerprint of a page's stylesheet sources, in order
///
/// Each source is length-framed, so moving text from one source to the
/// next changes the fingerprint.
pub fn css_fingerprint(sources: &[CssSource]) -> String {
    let mut hasher = Sha256::new();
    for source in sources {
        update_framed(&mut hasher, source.media.as_deref().unwrap_or("").as_bytes());
        update_framed(&mut hasher, source.base.as_ref().map(Url::as_str).unwrap_or("").as_bytes());
        update_framed(&mut hasher, source.css.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint of a selector set, independent of insertion order
pub fn selector_fingerprint(set: &CriticalSelectorSet) -> String {
    let mut hasher = Sha256::new();
    for selector in set.sorted() {
        update_framed(&mut hasher, selector.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// What the cache decided for this request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// A matching entry exists: show this critical CSS now
    Show(String),
    /// Freshly computed and stored; show on a later request
    Stored(String),
    /// Computed, but the store failed; nothing was persisted
    NotCacheable(String),
}

impl CacheDecision {
    pub fn critical_css(&self) -> &str {
        match self {
            CacheDecision::Show(css) | CacheDecision::Stored(css) | CacheDecision::NotCacheable(css) => css,
        }
    }
}

/// Critical CSS cache for one page
pub struct ResultCache<'a> {
    store: &'a dyn PropertyStore,
    key: PropertyKey,
}

impl<'a> ResultCache<'a> {
    pub fn new(store: &'a dyn PropertyStore, key: PropertyKey) -> Self {
        Self { store, key }
    }

    /// Read the stored entry; a value that does not decode counts as absent
    pub fn load(&self) -> StoreResult<Option<CacheEntry>> {
        let bytes = match self.store.get(&self.key)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!("Discarding corrupt cache entry for {}: {}", self.key, e);
                Ok(None)
            }
        }
    }

    /// Overwrite the stored entry
    pub fn store(&self, entry: &CacheEntry) -> StoreResult<()> {
        self.store.set(&self.key, serde_json::to_vec(entry)?)
    }

    /// Decide whether this request may show critical CSS, computing and
    /// storing it when no valid entry exists
    pub fn resolve<F>(&self, css_fingerprint: &str, selector_fingerprint: &str, compute: F) -> CacheDecision
    where
        F: FnOnce() -> String,
    {
        match self.load() {
            Ok(Some(entry)) if entry.matches(css_fingerprint, selector_fingerprint) => {
                debug!("Critical CSS cache hit for {}", self.key);
                return CacheDecision::Show(entry.critical_css);
            }
            Ok(Some(_)) => debug!("Critical CSS cache entry for {} is stale", self.key),
            Ok(None) => debug!("Critical CSS cache miss for {}", self.key),
            Err(e) => {
                warn!("Critical CSS cache read failed for {}: {}", self.key, e);
                return CacheDecision::NotCacheable(compute());
            }
        }

        let entry = CacheEntry {
            css_fingerprint: css_fingerprint.to_string(),
            selector_fingerprint: selector_fingerprint.to_string(),
            critical_css: compute(),
        };
        match self.store(&entry) {
            Ok(()) => CacheDecision::Stored(entry.critical_css),
            Err(e) => {
                warn!("Critical CSS cache write failed for {}: {}", self.key, e);
                CacheDecision::NotCacheable(entry.critical_css)
            }
        }
    }
}
