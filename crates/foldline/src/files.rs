//! File-backed store and stylesheet resolver for the command line

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::warn;
use serde::{Deserialize, Serialize};
use url::Url;

use foldline_critical::{MemoryStore, PropertyKey, PropertyStore, StoreError, StoreResult, StylesheetResolver};

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    properties: Vec<StoredProperty>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredProperty {
    #[serde(flatten)]
    key: PropertyKey,
    /// Base64 of the raw value
    value: String,
}

/// Property store persisted as one JSON file, rewritten on every change
pub struct JsonFileStore {
    path: PathBuf,
    values: MemoryStore,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let file: StoreFile = match fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == ErrorKind::NotFound => StoreFile::default(),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::with_capacity(file.properties.len());
        for property in file.properties {
            let value = STANDARD
                .decode(property.value.as_bytes())
                .map_err(|_| StoreError::Corrupt(property.key.to_string()))?;
            entries.push((property.key, value));
        }

        Ok(Self {
            path,
            values: MemoryStore::from_entries(entries),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> StoreResult<()> {
        let file = StoreFile {
            properties: self
                .values
                .entries()?
                .into_iter()
                .map(|(key, value)| StoredProperty {
                    key,
                    value: STANDARD.encode(value),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        // Replace the file in one step so readers never see half of it
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Write the store out, putting `key` back to `previous` if that fails
    fn flush_or_restore(&self, key: &PropertyKey, previous: Option<Vec<u8>>) -> StoreResult<()> {
        let Err(e) = self.flush() else {
            return Ok(());
        };
        let restored = match previous {
            Some(value) => self.values.set(key, value),
            None => self.values.delete(key),
        };
        if let Err(restore) = restored {
            warn!("Cannot restore {} after a failed write: {}", key, restore);
        }
        Err(e)
    }
}

impl PropertyStore for JsonFileStore {
    fn get(&self, key: &PropertyKey) -> StoreResult<Option<Vec<u8>>> {
        self.values.get(key)
    }

    fn set(&self, key: &PropertyKey, value: Vec<u8>) -> StoreResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let previous = self.values.get(key)?;
        self.values.set(key, value)?;
        self.flush_or_restore(key, previous)
    }

    fn delete(&self, key: &PropertyKey) -> StoreResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let previous = self.values.get(key)?;
        self.values.delete(key)?;
        self.flush_or_restore(key, previous)
    }
}

/// Reads stylesheets from disk
///
/// `file:` URLs are read directly. URLs on the page's own site are mapped
/// onto a local root directory when one is given.
#[derive(Debug, Default)]
pub struct FileResolver {
    site: Option<(Url, PathBuf)>,
}

impl FileResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve URLs with the same origin as `page_url` from `root`
    pub fn with_site_root(page_url: &Url, root: impl Into<PathBuf>) -> Self {
        Self {
            site: Some((page_url.clone(), root.into())),
        }
    }

    fn local_path(&self, url: &Url) -> Option<PathBuf> {
        if url.scheme() == "file" {
            return url.to_file_path().ok();
        }
        let (site, root) = self.site.as_ref()?;
        if url.origin() != site.origin() {
            return None;
        }
        Some(root.join(url.path().trim_start_matches('/')))
    }
}

impl StylesheetResolver for FileResolver {
    fn fetch(&self, url: &Url) -> Option<String> {
        let path = self.local_path(url)?;
        match fs::read_to_string(&path) {
            Ok(css) => Some(css),
            Err(e) => {
                warn!("Cannot read stylesheet {} ({}): {}", url, path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("foldline-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_store_persists_across_opens() {
        let dir = scratch_dir("store");
        let path = dir.join("store.json");
        let key = PropertyKey::new("http://example.com/", "dom", "critical_css_summary");

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get(&key).unwrap(), None);
        store.set(&key, vec![0, 159, 146, 150]).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), Some(vec![0, 159, 146, 150]));

        reopened.delete(&key).unwrap();
        assert_eq!(JsonFileStore::open(&path).unwrap().get(&key).unwrap(), None);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_write_keeps_memory_and_file_in_step() {
        let dir = scratch_dir("failedwrite");
        let path = dir.join("store.json");
        let key = PropertyKey::new("http://example.com/", "dom", "critical_css_summary");
        let other = PropertyKey::new("http://example.com/", "beacon", "critical_selectors");

        let store = JsonFileStore::open(&path).unwrap();
        store.set(&key, b"old".to_vec()).unwrap();

        // The temporary file cannot be created while a directory holds its name
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        assert!(store.set(&key, b"new".to_vec()).is_err());
        assert_eq!(store.get(&key).unwrap(), Some(b"old".to_vec()));
        assert!(store.set(&other, b"x".to_vec()).is_err());
        assert_eq!(store.get(&other).unwrap(), None);
        assert!(store.delete(&key).is_err());
        assert_eq!(store.get(&key).unwrap(), Some(b"old".to_vec()));

        assert_eq!(JsonFileStore::open(&path).unwrap().get(&key).unwrap(), Some(b"old".to_vec()));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_store_rejects_bad_file() {
        let dir = scratch_dir("badstore");
        let path = dir.join("store.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Serialization(_))));

        fs::write(
            &path,
            r#"{"properties":[{"page":"p","cohort":"c","property":"x","value":"***"}]}"#,
        )
        .unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(StoreError::Corrupt(_))));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resolver_file_urls() {
        let dir = scratch_dir("files");
        fs::write(dir.join("a.css"), "p{margin:0}").unwrap();
        let url = Url::from_file_path(dir.join("a.css")).unwrap();
        let resolver = FileResolver::new();
        assert_eq!(resolver.fetch(&url).as_deref(), Some("p{margin:0}"));
        assert_eq!(resolver.fetch(&Url::from_file_path(dir.join("b.css")).unwrap()), None);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_resolver_site_root() {
        let dir = scratch_dir("site");
        fs::create_dir_all(dir.join("css")).unwrap();
        fs::write(dir.join("css/site.css"), "div{}").unwrap();
        let page = Url::parse("http://example.com/index.html").unwrap();
        let resolver = FileResolver::with_site_root(&page, &dir);

        let same_site = Url::parse("http://example.com/css/site.css").unwrap();
        assert_eq!(resolver.fetch(&same_site).as_deref(), Some("div{}"));
        let other_site = Url::parse("http://cdn.example.com/css/site.css").unwrap();
        assert_eq!(resolver.fetch(&other_site), None);
        assert_eq!(FileResolver::new().fetch(&same_site), None);
        fs::remove_dir_all(&dir).unwrap();
    }
}
