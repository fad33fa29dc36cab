//! Persistent key-value cache collaborator.
//!
//! The metadata store and the route table each persist one opaque blob under
//! a fixed key. The trait is deliberately minimal — `get`/`set` on byte
//! blobs — so hosts can plug in whatever store they already run. Two default
//! implementations are provided: an in-memory map and a file-per-key store
//! with atomic writes.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::RwLock;
use tracing::warn;

/// Blob store used to persist derived state across process restarts.
///
/// Implementations must tolerate concurrent readers; the dispatch layer
/// writes at most once per process lifetime per key.
pub trait CacheStore: Send + Sync {
    /// Read the blob stored under `key`, if any.
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    /// Store `value` under `key`, replacing any previous blob.
    ///
    /// Failures are the implementation's concern: a cache write that does not
    /// stick degrades startup time, not correctness, so implementations log
    /// and continue rather than propagate.
    fn set(&self, key: &str, value: &[u8]);
}

/// In-memory cache store. State dies with the process; useful for tests and
/// hosts that do not want persistence.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .expect("cache lock poisoned")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &[u8]) {
        self.entries
            .write()
            .expect("cache lock poisoned")
            .insert(key.to_string(), value.to_vec());
    }
}

/// File-per-key cache store with atomic replacement.
///
/// Each key maps to one file inside the store directory; writes go to a
/// temporary sibling first and are moved into place with `rename`, so readers
/// never observe a half-written blob.
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Map a cache key to a file path, replacing bytes that are unsafe in
    /// file names.
    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file}.cache"))
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    fn set(&self, key: &str, value: &[u8]) {
        let path = self.path_for(key);
        let tmp = path.with_extension("cache.tmp");
        let result = fs::write(&tmp, value).and_then(|()| fs::rename(&tmp, &path));
        if let Err(error) = result {
            warn!(key = %key, path = %path.display(), %error, "cache write failed");
        }
    }
}
