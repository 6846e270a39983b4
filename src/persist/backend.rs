use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::PersistError;

/// A key-value backing store for persisted envelopes.
///
/// The contract is deliberately narrow: string keys, string payloads,
/// explicit errors. Anything that can hold a string per key qualifies.
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn write(&self, key: &str, payload: &str) -> Result<(), PersistError>;
}

/// In-memory backend, mainly for tests and ephemeral stores.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored payload, bypassing the envelope codec. Test hook.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn write(&self, key: &str, payload: &str) -> Result<(), PersistError> {
        self.entries
            .lock()
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }
}

/// File-per-key backend rooted at a directory.
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl StorageBackend for FileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, PersistError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistError::Read {
                key: key.to_string(),
                message: e.to_string(),
            }),
        }
    }

    fn write(&self, key: &str, payload: &str) -> Result<(), PersistError> {
        std::fs::create_dir_all(&self.root).map_err(|e| PersistError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(self.path_for(key), payload).map_err(|e| PersistError::Write {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}
