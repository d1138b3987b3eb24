//! Stage artifact storage.
//!
//! A store persists named artifact blobs and answers substring lookups on
//! their names. Artifacts are write-once: nothing here updates a blob in
//! place. `DirStageStore` is the production implementation over the debug
//! directory; `MemoryStageStore` is the in-memory double used by tests.

use crate::models::{PreftuneError, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Storage for stage artifacts.
pub trait StageStore {
    /// Find a persisted artifact whose name contains `stage_name` as a
    /// substring. Returns the first match in the store's scan order.
    fn find(&self, stage_name: &str) -> Result<Option<String>>;

    /// Load an artifact blob by name.
    fn load(&self, name: &str) -> Result<Vec<u8>>;

    /// Persist a blob under a fresh `{stage_name}_{uuid}.csv` name and
    /// return that name.
    fn save(&self, stage_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Stage store over a debug directory on disk.
///
/// Not safe for concurrent runs against the same directory: the gap between
/// `find` and `save` is unsynchronized, so two pipelines can both miss and
/// write duplicate artifacts.
#[derive(Debug)]
pub struct DirStageStore {
    dir: PathBuf,
}

impl DirStageStore {
    /// Open a store over `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| PreftuneError::storage(format!("creating debug dir {}", dir.display()), e))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// The directory backing this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StageStore for DirStageStore {
    fn find(&self, stage_name: &str) -> Result<Option<String>> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| PreftuneError::storage("scanning debug dir", e))?;

        // Directory order is platform-dependent; sort so "first match" is
        // stable across runs.
        let mut names: Vec<String> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PreftuneError::storage("scanning debug dir", e))?;
            if let Ok(name) = entry.file_name().into_string() {
                if name.contains(stage_name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names.into_iter().next())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.dir.join(name))
            .map_err(|e| PreftuneError::storage(format!("reading artifact {name}"), e))
    }

    fn save(&self, stage_name: &str, bytes: &[u8]) -> Result<String> {
        let name = format!("{stage_name}_{}.csv", Uuid::new_v4());
        fs::write(self.dir.join(&name), bytes)
            .map_err(|e| PreftuneError::storage(format!("writing artifact {name}"), e))?;
        debug!(artifact = %name, "Artifact written");
        Ok(name)
    }
}

/// In-memory stage store for tests.
#[derive(Debug, Default)]
pub struct MemoryStageStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an artifact under an explicit name.
    pub fn insert(&self, name: &str, bytes: Vec<u8>) {
        self.entries
            .lock()
            .expect("store mutex poisoned")
            .insert(name.to_string(), bytes);
    }

    /// Number of artifacts currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.entries
            .lock()
            .map_err(|_| PreftuneError::Internal("memory store mutex poisoned".to_string()))
    }
}

impl StageStore for MemoryStageStore {
    fn find(&self, stage_name: &str) -> Result<Option<String>> {
        let entries = self.lock()?;
        Ok(entries.keys().find(|name| name.contains(stage_name)).cloned())
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        let entries = self.lock()?;
        entries.get(name).cloned().ok_or_else(|| {
            PreftuneError::Internal(format!("artifact {name} missing from memory store"))
        })
    }

    fn save(&self, stage_name: &str, bytes: &[u8]) -> Result<String> {
        let name = format!("{stage_name}_{}.csv", Uuid::new_v4());
        self.lock()?.insert(name.clone(), bytes.to_vec());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_store_save_and_find() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStageStore::new(dir.path()).unwrap();

        let name = store.save("preferences", b"prompt,accepted_answer,rejected_answer\n").unwrap();
        assert!(name.starts_with("preferences_"));
        assert!(name.ends_with(".csv"));

        let found = store.find("preferences").unwrap();
        assert_eq!(found.as_deref(), Some(name.as_str()));
        assert_eq!(store.find("dpo_model").unwrap(), None);
    }

    #[test]
    fn test_dir_store_substring_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStageStore::new(dir.path()).unwrap();
        std::fs::write(dir.path().join("old_preferences_backup.csv"), b"x").unwrap();

        // Any filename containing the stage name counts as the artifact.
        let found = store.find("preferences").unwrap();
        assert_eq!(found.as_deref(), Some("old_preferences_backup.csv"));
    }

    #[test]
    fn test_dir_store_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStageStore::new(dir.path()).unwrap();
        let name = store.save("dpo_model", b"manifest").unwrap();
        assert_eq!(store.load(&name).unwrap(), b"manifest");
    }

    #[test]
    fn test_unwritable_dir_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("debug");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = DirStageStore::new(&blocker).unwrap_err();
        assert!(matches!(err, PreftuneError::Storage { .. }));
    }

    #[test]
    fn test_memory_store_behaves_like_dir_store() {
        let store = MemoryStageStore::new();
        assert!(store.is_empty());

        let name = store.save("preferences", b"rows").unwrap();
        assert_eq!(store.find("preferences").unwrap(), Some(name.clone()));
        assert_eq!(store.load(&name).unwrap(), b"rows");
        assert_eq!(store.len(), 1);
    }
}
