//! JSON file storage backend.
//!
//! The whole key/value map lives in one JSON object. Every mutation rewrites
//! the file through a temporary sibling and an atomic rename, so a crash never
//! leaves a half-written credential behind.

use crate::{StorageBackend, StorageError, StorageResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

type Entries = BTreeMap<String, String>;

/// File-backed storage, persisted across client runs.
pub struct FileStorage {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileStorage {
    /// Create a storage backend at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> StorageResult<Entries> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Entries::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            StorageError::Encoding(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write_entries(&self, entries: &Entries) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Encoding(e.to_string()))?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        restrict_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), entries = entries.len(), "Credential file written");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> StorageResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> StorageResult<()> {
    Ok(())
}

impl StorageBackend for FileStorage {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock();
        Ok(self.read_entries()?.remove(key))
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_none() {
            return Ok(false);
        }
        self.write_entries(&entries)?;
        Ok(true)
    }
}
