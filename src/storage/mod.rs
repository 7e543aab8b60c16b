//! # Storage Module
//!
//! Small key-value namespaces persisted as JSON objects on disk.
//!
//! Each namespace lives in `<data_dir>/<name>.json`. Writes go to a sibling
//! temporary file which is synced and then renamed over the target, so a
//! reader only ever sees a complete old value or a complete new value.
//! A missing or corrupt file reads as an empty namespace.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SyncError};

/// Namespace holding `jwt` and `refreshToken`
pub const AUTH_NAMESPACE: &str = "AuthPrefs";

/// Namespace holding the serialized telemetry buffer
pub const TELEMETRY_NAMESPACE: &str = "GarminData";

/// One persisted key-value namespace
#[derive(Debug, Clone)]
pub struct KvNamespace {
    path: PathBuf,
}

impl KvNamespace {
    /// Open (or lazily create) namespace `name` under `data_dir`
    ///
    /// The directory is created if needed; the file itself is only written
    /// on the first mutation.
    pub fn open<P: AsRef<Path>>(data_dir: P, name: &str) -> Result<Self> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(SyncError::Storage(format!("invalid namespace name: {:?}", name)));
        }
        fs::create_dir_all(data_dir.as_ref())?;
        Ok(Self {
            path: data_dir.as_ref().join(format!("{}.json", name)),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a single key
    pub fn get(&self, key: &str) -> Option<String> {
        self.load().remove(key)
    }

    /// Write a single key, durable before returning
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.load();
        entries.insert(key.to_string(), value.to_string());
        self.store(&entries)
    }

    /// Remove the given keys in one write
    pub fn remove(&self, keys: &[&str]) -> Result<()> {
        let mut entries = self.load();
        let before = entries.len();
        for key in keys {
            entries.remove(*key);
        }
        if entries.len() == before {
            return Ok(());
        }
        self.store(&entries)
    }

    fn load(&self) -> BTreeMap<String, String> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring corrupt namespace file {}: {}", self.path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn store(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let encoded = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        debug!("Wrote {} keys to {}", entries.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let ns = KvNamespace::open(dir.path(), AUTH_NAMESPACE).unwrap();
        assert_eq!(ns.get("jwt"), None);
        assert!(!ns.path().exists());
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let ns = KvNamespace::open(dir.path(), AUTH_NAMESPACE).unwrap();
        ns.put("jwt", "abc").unwrap();
        ns.put("refreshToken", "def").unwrap();
        assert_eq!(ns.get("jwt").as_deref(), Some("abc"));
        assert_eq!(ns.get("refreshToken").as_deref(), Some("def"));
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        KvNamespace::open(dir.path(), TELEMETRY_NAMESPACE)
            .unwrap()
            .put("data_list", "[]")
            .unwrap();

        let reopened = KvNamespace::open(dir.path(), TELEMETRY_NAMESPACE).unwrap();
        assert_eq!(reopened.get("data_list").as_deref(), Some("[]"));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let dir = TempDir::new().unwrap();
        let auth = KvNamespace::open(dir.path(), AUTH_NAMESPACE).unwrap();
        let data = KvNamespace::open(dir.path(), TELEMETRY_NAMESPACE).unwrap();
        auth.put("jwt", "token").unwrap();
        assert_eq!(data.get("jwt"), None);
    }

    #[test]
    fn test_remove_keys() {
        let dir = TempDir::new().unwrap();
        let ns = KvNamespace::open(dir.path(), AUTH_NAMESPACE).unwrap();
        ns.put("jwt", "a").unwrap();
        ns.put("refreshToken", "b").unwrap();
        ns.put("other", "c").unwrap();

        ns.remove(&["jwt", "refreshToken"]).unwrap();

        assert_eq!(ns.get("jwt"), None);
        assert_eq!(ns.get("refreshToken"), None);
        assert_eq!(ns.get("other").as_deref(), Some("c"));
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let ns = KvNamespace::open(dir.path(), AUTH_NAMESPACE).unwrap();
        fs::write(ns.path(), "{not json").unwrap();

        assert_eq!(ns.get("jwt"), None);

        // A write replaces the corrupt content
        ns.put("jwt", "fresh").unwrap();
        assert_eq!(ns.get("jwt").as_deref(), Some("fresh"));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let ns = KvNamespace::open(dir.path(), AUTH_NAMESPACE).unwrap();
        ns.put("jwt", "abc").unwrap();
        assert!(!ns.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_invalid_namespace_name() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            KvNamespace::open(dir.path(), "../escape"),
            Err(SyncError::Storage(_))
        ));
        assert!(KvNamespace::open(dir.path(), "").is_err());
    }
}
