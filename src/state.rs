//! Seen-id store — persisted set of processed message identifiers.
//!
//! One identifier per line. A missing file is an empty store; any other
//! I/O failure is fatal to the run, because without the store a digest
//! cannot be deduplicated against earlier runs.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::StoreError;

/// Identifiers kept on save — the most recent by insertion order.
const MAX_SAVED_IDS: usize = 500;

/// Insertion-ordered set of processed message identifiers.
pub struct SeenStore {
    path: PathBuf,
    /// Insertion order = discovery order. Oldest first.
    order: Vec<String>,
    index: HashSet<String>,
    dirty: bool,
}

impl SeenStore {
    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let mut store = Self {
            path: path.clone(),
            order: Vec::new(),
            index: HashSet::new(),
            dirty: false,
        };

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file; starting with empty store");
                return Ok(store);
            }
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        for line in contents.lines() {
            let id = line.trim();
            if !id.is_empty() {
                store.push(id);
            }
        }
        store.dirty = false;
        Ok(store)
    }

    /// Whether `id` was already processed by this or an earlier run.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    /// Record `id` as processed. Returns false if it was already present.
    pub fn insert(&mut self, id: &str) -> bool {
        let inserted = self.push(id);
        if inserted {
            self.dirty = true;
        }
        inserted
    }

    /// Number of identifiers currently held.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether the store changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the most recent [`MAX_SAVED_IDS`] identifiers, one per
    /// line, sorted for determinism. Written via a temp file and an
    /// atomic rename so a crash never leaves a half-written store.
    pub fn save(&mut self) -> Result<(), StoreError> {
        let start = self.order.len().saturating_sub(MAX_SAVED_IDS);
        let mut recent: Vec<&str> = self.order[start..].iter().map(String::as_str).collect();
        recent.sort_unstable();

        let mut contents = recent.join("\n");
        contents.push('\n');

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents).map_err(write_err)?;
        fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(
            path = %self.path.display(),
            saved = recent.len(),
            "Saved seen-id store"
        );
        self.dirty = false;
        Ok(())
    }

    fn push(&mut self, id: &str) -> bool {
        if !self.index.insert(id.to_string()) {
            return false;
        }
        self.order.push(id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> SeenStore {
        SeenStore::load(dir.path().join("seen-ids.txt")).unwrap()
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.is_empty());
        assert!(!store.is_dirty());
    }

    #[test]
    fn round_trips_identifiers() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.insert("msg-b");
        store.insert("msg-a");
        assert!(store.is_dirty());
        store.save().unwrap();
        assert!(!store.is_dirty());

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains("msg-a"));
        assert!(reloaded.contains("msg-b"));
    }

    #[test]
    fn save_writes_sorted_lines() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.insert("zzz");
        store.insert("aaa");
        store.save().unwrap();

        let contents = fs::read_to_string(dir.path().join("seen-ids.txt")).unwrap();
        assert_eq!(contents, "aaa\nzzz\n");
    }

    #[test]
    fn save_caps_to_most_recent_by_insertion() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        for i in 0..600 {
            store.insert(&format!("id-{i:04}"));
        }
        store.save().unwrap();

        let reloaded = store_in(&dir);
        assert_eq!(reloaded.len(), 500);
        // The 100 oldest were dropped; the newest survived.
        assert!(!reloaded.contains("id-0000"));
        assert!(!reloaded.contains("id-0099"));
        assert!(reloaded.contains("id-0100"));
        assert!(reloaded.contains("id-0599"));
    }

    #[test]
    fn insert_dedups() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        assert!(store.insert("msg-1"));
        assert!(!store.insert("msg-1"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state/seen-ids.txt");
        let mut store = SeenStore::load(&path).unwrap();
        store.insert("msg-1");
        store.save().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let mut store = store_in(&dir);
        store.insert("msg-1");
        store.save().unwrap();
        assert!(!dir.path().join("seen-ids.tmp").exists());
    }
}
