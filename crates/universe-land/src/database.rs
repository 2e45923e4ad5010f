//! Key-value persistence for land terrain.
//!
//! The store only needs `get`/`set` on opaque byte values. A missing key is
//! `Ok(None)`; any other failure is an error and must not be mistaken for
//! "no data".

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dashmap::DashMap;

/// Errors raised by a [`LandDatabase`] backend.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Underlying I/O failed.
    #[error("database I/O error on {key}: {source}")]
    Io {
        /// Key being accessed.
        key: String,
        /// Cause.
        #[source]
        source: std::io::Error,
    },

    /// Key contains characters the backend cannot store.
    #[error("invalid database key {0:?}")]
    InvalidKey(String),

    /// Backend-specific failure.
    #[error("database backend error: {0}")]
    Backend(String),
}

/// Key-value store used to persist generated terrain.
pub trait LandDatabase: Send + Sync {
    /// Fetch the value for `key`; `Ok(None)` if absent.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DatabaseError>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), DatabaseError>;
}

// ---------------------------------------------------------------------------
// MemoryDatabase
// ---------------------------------------------------------------------------

/// Concurrent in-memory store, shareable with loader threads.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryDatabase {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if `key` has a value.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl LandDatabase for MemoryDatabase {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DatabaseError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), DatabaseError> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileDatabase
// ---------------------------------------------------------------------------

/// One file per key inside a root directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never observes a half-written value.
#[derive(Debug, Clone)]
pub struct FileDatabase {
    root: PathBuf,
}

impl FileDatabase {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| DatabaseError::Io {
            key: root.display().to_string(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Directory holding the value files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, DatabaseError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(DatabaseError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.bin")))
    }
}

impl LandDatabase for FileDatabase {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, DatabaseError> {
        let path = self.path_for(key)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(DatabaseError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), DatabaseError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        let io_err = |source| DatabaseError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::write(&tmp, value).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)
    }
}
