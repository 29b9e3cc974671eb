//! Scoped key/value string stores under the durable backends
//!
//! [`VolatileStore`] lives as long as the process and [`FileStore`] keeps
//! one file per key in a directory. Both enforce a byte quota the same way a
//! browser storage area would and refuse writes that would exceed it.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures of a scoped store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage quota of {quota} bytes exceeded")]
    QuotaExceeded { quota: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Synchronous string store with a size budget
pub trait ScopedStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key, true if it existed
    fn remove_item(&self, key: &str) -> Result<bool, StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;

    /// Bytes currently charged against the quota
    fn used_bytes(&self) -> usize;

    /// Whether calls block on I/O and belong on the blocking pool
    fn is_blocking(&self) -> bool {
        false
    }
}

fn item_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

/// Process-scoped store, the session analogue
pub struct VolatileStore {
    quota: usize,
    state: Mutex<VolatileState>,
}

#[derive(Default)]
struct VolatileState {
    items: HashMap<String, String>,
    used: usize,
}

impl VolatileStore {
    pub fn new(quota: usize) -> Self {
        Self {
            quota,
            state: Mutex::new(VolatileState::default()),
        }
    }
}

impl ScopedStore for VolatileStore {
    fn name(&self) -> &'static str {
        "session"
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state.lock().items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        let previous = state
            .items
            .get(key)
            .map(|old| item_size(key, old))
            .unwrap_or(0);
        let used = state.used - previous + item_size(key, value);
        if used > self.quota {
            return Err(StoreError::QuotaExceeded { quota: self.quota });
        }

        state.items.insert(key.to_string(), value.to_string());
        state.used = used;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        match state.items.remove(key) {
            Some(old) => {
                state.used = state.used.saturating_sub(item_size(key, &old));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state.lock().items.keys().cloned().collect())
    }

    fn used_bytes(&self) -> usize {
        self.state.lock().used
    }
}

/// Directory-backed store, the persistent analogue
///
/// File names are the hex encoded key, so any key maps to a safe name.
/// The directory is created on first write.
pub struct FileStore {
    dir: PathBuf,
    quota: usize,
    /// Serializes writers; `None` until the directory has been measured
    used: Mutex<Option<usize>>,
}

const ITEM_EXTENSION: &str = "item";

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, quota: usize) -> Self {
        Self {
            dir: dir.into(),
            quota,
            used: Mutex::new(None),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{ITEM_EXTENSION}", hex::encode(key.as_bytes())))
    }

    fn key_for(path: &Path) -> Option<String> {
        if path.extension()? != ITEM_EXTENSION {
            return None;
        }
        let bytes = hex::decode(path.file_stem()?.to_str()?).ok()?;
        String::from_utf8(bytes).ok()
    }

    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn measure(&self) -> Result<usize, StoreError> {
        let mut used = 0;
        for key in self.keys()? {
            if let Some(value) = self.read(&key)? {
                used += item_size(&key, &value);
            }
        }
        Ok(used)
    }

    fn usage<'a>(&self, cached: &'a mut Option<usize>) -> Result<&'a mut usize, StoreError> {
        if cached.is_none() {
            *cached = Some(self.measure()?);
        }
        Ok(cached.get_or_insert(0))
    }
}

impl ScopedStore for FileStore {
    fn name(&self) -> &'static str {
        "persistent"
    }

    fn is_blocking(&self) -> bool {
        true
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.read(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut guard = self.used.lock();
        let previous = self
            .read(key)?
            .map(|old| item_size(key, &old))
            .unwrap_or(0);
        let used = self.usage(&mut guard)?;
        let next = *used - previous.min(*used) + item_size(key, value);
        if next > self.quota {
            return Err(StoreError::QuotaExceeded { quota: self.quota });
        }

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let staging = path.with_extension("tmp");
        fs::write(&staging, value)?;
        fs::rename(&staging, &path)?;

        *used = next;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<bool, StoreError> {
        let mut guard = self.used.lock();
        let Some(old) = self.read(key)? else {
            return Ok(false);
        };

        match fs::remove_file(self.path_for(key)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        if let Some(used) = guard.as_mut() {
            *used = used.saturating_sub(item_size(key, &old));
        }
        Ok(true)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut keys = Vec::new();
        for entry in entries {
            if let Some(key) = Self::key_for(&entry?.path()) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn used_bytes(&self) -> usize {
        let mut guard = self.used.lock();
        self.usage(&mut guard).map(|used| *used).unwrap_or(0)
    }
}
