//! Asynchronous transactional backend on LMDB
//!
//! Uses the heed crate to keep encoded entries in a single named database.
//! The environment is opened on first use, and every operation runs its own
//! transaction on the blocking pool so callers never stall the runtime.

use super::CacheBackend;
use crate::cache::codec::EntryCodec;
use crate::cache::config::SerializationConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::Utc;
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Name of the LMDB database holding entries
const STORE_NAME: &str = "cache-entries";

const BACKEND_NAME: &str = "transactional";

#[derive(Clone)]
struct LmdbStore {
    env: Env,
    db: Database<Str, Str>,
}

/// LMDB-backed store, the indexed-database analogue
pub struct TransactionalBackend {
    path: PathBuf,
    map_size_mb: usize,
    codec: EntryCodec,
    store: OnceCell<LmdbStore>,
}

fn unavailable(reason: impl std::fmt::Display) -> CacheError {
    CacheError::StorageUnavailable {
        backend: BACKEND_NAME,
        reason: reason.to_string(),
    }
}

impl TransactionalBackend {
    pub fn new(
        path: impl Into<PathBuf>,
        map_size_mb: usize,
        serialization: &SerializationConfig,
    ) -> Self {
        Self {
            path: path.into(),
            map_size_mb,
            codec: EntryCodec::from_config(serialization),
            store: OnceCell::new(),
        }
    }

    async fn open(&self) -> Result<LmdbStore> {
        let path = self.path.clone();
        let map_size = self.map_size_mb * 1024 * 1024;

        let store = tokio::task::spawn_blocking(move || -> heed::Result<LmdbStore> {
            std::fs::create_dir_all(&path).map_err(heed::Error::Io)?;

            let env = unsafe {
                EnvOpenOptions::new()
                    .map_size(map_size)
                    .max_dbs(1)
                    .open(&path)
            }?;

            let mut wtxn = env.write_txn()?;
            let db: Database<Str, Str> = env.create_database(&mut wtxn, Some(STORE_NAME))?;
            wtxn.commit()?;

            Ok(LmdbStore { env, db })
        })
        .await
        .map_err(unavailable)?
        .map_err(unavailable)?;

        info!("Opened transactional cache store at {:?}", self.path);
        Ok(store)
    }

    /// Run one transaction body on the blocking pool
    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LmdbStore) -> heed::Result<T> + Send + 'static,
    {
        let store = self.store.get_or_try_init(|| self.open()).await?.clone();

        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(unavailable)?
            .map_err(unavailable)
    }

    fn skipped(operation: &str, key: &str, err: &CacheError) {
        warn!("Cache {} of '{}' skipped: {}", operation, key, err);
    }
}

#[async_trait]
impl CacheBackend for TransactionalBackend {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let owned = key.to_string();
        let raw = self
            .run(move |store| {
                let rtxn = store.env.read_txn()?;
                Ok(store.db.get(&rtxn, owned.as_str())?.map(str::to_owned))
            })
            .await;

        let raw = match raw {
            Ok(raw) => raw?,
            Err(e) => {
                Self::skipped("read", key, &e);
                return None;
            }
        };

        match self.codec.decode(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Dropping undecodable cache entry '{}': {}", key, e);
                self.delete(key).await;
                None
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<bool> {
        let raw = self.codec.encode(&entry)?;
        let owned = key.to_string();

        let written = self
            .run(move |store| {
                let mut wtxn = store.env.write_txn()?;
                store.db.put(&mut wtxn, owned.as_str(), raw.as_str())?;
                wtxn.commit()
            })
            .await;

        match written {
            Ok(()) => Ok(true),
            Err(e) => {
                Self::skipped("write", key, &e);
                Ok(false)
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let owned = key.to_string();
        let deleted = self
            .run(move |store| {
                let mut wtxn = store.env.write_txn()?;
                let existed = store.db.delete(&mut wtxn, owned.as_str())?;
                wtxn.commit()?;
                Ok(existed)
            })
            .await;

        deleted.unwrap_or_else(|e| {
            Self::skipped("removal", key, &e);
            false
        })
    }

    async fn clear(&self) {
        let cleared = self
            .run(|store| {
                let mut wtxn = store.env.write_txn()?;
                store.db.clear(&mut wtxn)?;
                wtxn.commit()
            })
            .await;

        match cleared {
            Ok(()) => debug!("Cleared transactional cache store"),
            Err(e) => Self::skipped("clear", "*", &e),
        }
    }

    async fn cleanup(&self) -> Result<Vec<CacheKey>> {
        let codec = self.codec;
        let now = Utc::now();

        self.run(move |store| {
            let rtxn = store.env.read_txn()?;
            let mut stale = Vec::new();
            for item in store.db.iter(&rtxn)? {
                let (key, raw) = item?;
                let expired = codec
                    .decode(raw)
                    .map(|entry| !entry.is_live_at(now))
                    .unwrap_or(true);
                if expired {
                    stale.push(key.to_string());
                }
            }
            Ok(stale)
        })
        .await
    }

    async fn contains(&self, key: &str) -> bool {
        let owned = key.to_string();
        self.run(move |store| {
            let rtxn = store.env.read_txn()?;
            Ok(store.db.get(&rtxn, owned.as_str())?.is_some())
        })
        .await
        .unwrap_or(false)
    }

    async fn len(&self) -> usize {
        self.run(|store| {
            let rtxn = store.env.read_txn()?;
            store.db.len(&rtxn)
        })
        .await
        .map(|len| len as usize)
        .unwrap_or(0)
    }
}
