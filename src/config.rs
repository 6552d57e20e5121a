//! Configuration Module
//!
//! Handles cache construction parameters and their defaults.

use std::env;
use std::path::PathBuf;

/// Default maximum total size of finalized entries, in bytes (64 MB).
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;

/// Cache construction parameters.
///
/// All values can also be loaded from environment variables with sensible
/// defaults via [`Config::from_env`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Storage identity: names the metadata database file and the default
    /// storage subdirectory
    pub name: String,
    /// Storage root directory; when `None`, a per-name directory under the
    /// OS temp dir is used
    pub root_dir: Option<PathBuf>,
    /// Maximum total size of finalized entries in bytes; exceeding it
    /// triggers an eviction pass
    pub max_bytes: u64,
}

impl Config {
    /// Creates a new Config with the given storage name and size budget.
    ///
    /// # Arguments
    /// * `name` - Storage identity (database file name stem)
    /// * `max_bytes` - Maximum total size of finalized entries in bytes
    pub fn new(name: impl Into<String>, max_bytes: u64) -> Self {
        Self {
            name: name.into(),
            root_dir: None,
            max_bytes,
        }
    }

    /// Sets an explicit storage root directory.
    ///
    /// Blob files and the metadata database live directly under this
    /// directory.
    pub fn root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(dir.into());
        self
    }

    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `BLOBCACHE_NAME` - Storage identity (default: "blobcache")
    /// - `BLOBCACHE_ROOT_DIR` - Storage root directory (default: unset)
    /// - `BLOBCACHE_MAX_BYTES` - Size budget in bytes (default: 64 MB)
    pub fn from_env() -> Self {
        Self {
            name: env::var("BLOBCACHE_NAME").unwrap_or_else(|_| "blobcache".to_string()),
            root_dir: env::var("BLOBCACHE_ROOT_DIR").ok().map(PathBuf::from),
            max_bytes: env::var("BLOBCACHE_MAX_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_BYTES),
        }
    }

    /// Returns the effective storage root directory.
    ///
    /// Falls back to `<temp dir>/blobcache/<name>` when no explicit root
    /// was configured.
    pub fn resolved_root(&self) -> PathBuf {
        match &self.root_dir {
            Some(dir) => dir.clone(),
            None => env::temp_dir().join("blobcache").join(&self.name),
        }
    }

    /// Returns the path of the metadata database file.
    pub fn db_path(&self) -> PathBuf {
        self.resolved_root().join(format!("{}.db", self.name))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "blobcache".to_string(),
            root_dir: None,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}
