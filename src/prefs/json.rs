//! Preferences persisted as one JSON object on disk.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::{PrefKey, Preferences};
use crate::error::Result;
use crate::transfer::file::atomic_write;

/// A preference was set (`Some`) or removed (`None`).
#[derive(Debug, Clone, PartialEq)]
pub struct PrefChange {
    pub key: PrefKey,
    pub value: Option<Value>,
}

/// JSON-file-backed [`Preferences`].
///
/// Keys are stored under their [`PrefKey::storage_key`]. Every change is
/// written through atomically and announced on a broadcast channel.
#[derive(Debug)]
pub struct JsonPreferences {
    path: Option<PathBuf>,
    values: BTreeMap<String, Value>,
    changes: broadcast::Sender<PrefChange>,
}

impl JsonPreferences {
    /// Load preferences from `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), count = values.len(), "Loaded preferences");
        Ok(Self {
            path: Some(path.to_path_buf()),
            values,
            changes: broadcast::channel(32).0,
        })
    }

    /// Store kept only in memory.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            path: None,
            values: BTreeMap::new(),
            changes: broadcast::channel(32).0,
        }
    }

    /// Receive every subsequent change.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PrefChange> {
        self.changes.subscribe()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn persist(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let json = serde_json::to_string_pretty(&self.values)?;
            atomic_write(path, &json)?;
        }
        Ok(())
    }

    fn notify(&self, key: PrefKey, value: Option<Value>) {
        // no receivers is fine
        let _ = self.changes.send(PrefChange { key, value });
    }
}

impl Preferences for JsonPreferences {
    fn get(&self, key: PrefKey) -> Option<Value> {
        self.values.get(&key.storage_key()).cloned()
    }

    fn set(&mut self, key: PrefKey, value: Value) -> Result<()> {
        if value.is_null() {
            return self.remove(key);
        }
        self.values.insert(key.storage_key(), value.clone());
        self.persist()?;
        self.notify(key, Some(value));
        Ok(())
    }

    fn remove(&mut self, key: PrefKey) -> Result<()> {
        if self.values.remove(&key.storage_key()).is_some() {
            self.persist()?;
        }
        self.notify(key, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_set_get_persist() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("prefs").join("preferences.json");

        let mut prefs = JsonPreferences::open(&path).unwrap();
        prefs.set(PrefKey::AppLanguage, json!("de")).unwrap();
        prefs.set(PrefKey::TrashKeepinStock, json!(14)).unwrap();

        let reopened = JsonPreferences::open(&path).unwrap();
        assert_eq!(reopened.get(PrefKey::AppLanguage), Some(json!("de")));
        assert_eq!(reopened.get_u64(PrefKey::TrashKeepinStock), Some(14));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("LISTAGO_TrashKeepInStock"));
    }

    #[test]
    fn test_null_removes() {
        let mut prefs = JsonPreferences::memory();
        prefs.set(PrefKey::Animations, json!(false)).unwrap();
        prefs.set(PrefKey::Animations, Value::Null).unwrap();
        assert!(prefs.get(PrefKey::Animations).is_none());
    }

    #[test]
    fn test_export_uses_names() {
        let mut prefs = JsonPreferences::memory();
        prefs.set(PrefKey::LogMode, json!("debug")).unwrap();
        let exported = prefs.export();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported["LogMode"], json!("debug"));
    }

    #[test]
    fn test_subscribers_see_changes() {
        let mut prefs = JsonPreferences::memory();
        let mut rx = prefs.subscribe();
        prefs.set(PrefKey::GarminConnectIQ, json!(true)).unwrap();
        let change = rx.try_recv().unwrap();
        assert_eq!(change.key, PrefKey::GarminConnectIQ);
        assert_eq!(change.value, Some(json!(true)));
    }
}
