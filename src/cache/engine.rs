//! Cache Engine Module
//!
//! Orchestrates put/get/delete/eviction against the metadata store and the
//! blob store, maintains the in-memory running total of finalized bytes,
//! and recovers from interrupted writes at startup.
//!
//! The engine is the sole mutator of cache state. It has no locking of its
//! own: every call arrives through the single-writer worker, one at a time.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::cache::{BlobStore, CacheStats, MetaStore};
use crate::config::Config;
use crate::error::Result;

// == Cache Engine ==
/// Disk cache engine combining the metadata store, the blob store, and
/// size accounting with LRU eviction.
#[derive(Debug)]
pub struct CacheEngine {
    /// Durable key-to-slot metadata
    meta: MetaStore,
    /// Blob files on disk
    blobs: BlobStore,
    /// Size budget in bytes; exceeding it triggers eviction
    max_bytes: u64,
    /// Running total of finalized bytes, reconciled with the metadata
    /// store at startup and after every delete/eviction
    total_bytes: u64,
    /// Performance counters
    stats: CacheStats,
}

impl CacheEngine {
    // == Constructor ==
    /// Opens the engine for the given configuration, creating the storage
    /// root and the metadata database as needed.
    ///
    /// Does not run the recovery sweep; the worker runs [`recover`] as its
    /// first action so that cleanup happens in queue order.
    ///
    /// [`recover`]: CacheEngine::recover
    pub fn open(config: &Config) -> Result<Self> {
        let root = config.resolved_root();
        fs::create_dir_all(&root)?;
        let meta = MetaStore::open(&config.db_path())?;
        let blobs = BlobStore::new(&root)?;
        info!(root = %root.display(), max_bytes = config.max_bytes, "cache opened");
        Ok(Self {
            meta,
            blobs,
            max_bytes: config.max_bytes,
            total_bytes: 0,
            stats: CacheStats::new(),
        })
    }

    // == Startup Recovery ==
    /// Sweeps entries left unfinalized by a prior crash or kill: deletes
    /// their blob files and, for blobs successfully removed, their
    /// metadata rows. Then recomputes the running total from the store.
    ///
    /// A blob that cannot be removed keeps its metadata row so the sweep
    /// retries it on the next startup.
    pub fn recover(&mut self) {
        let stale = self.meta.list_unfinalized();
        if !stale.is_empty() {
            info!(count = stale.len(), "sweeping interrupted writes");
            self.remove_slots(&stale);
        }
        self.total_bytes = self.meta.total_finalized_size();
        self.stats.set_total_bytes(self.total_bytes);
    }

    // == Put ==
    /// Stores the byte source under `key`, overwriting any previous entry
    /// for the key in place (same slot id, same blob file).
    ///
    /// Sequence: read the prior finalized size, prepare the slot (entry
    /// becomes pending), stream the blob, finalize with the actual size,
    /// apply the size delta to the running total, then evict if the total
    /// exceeds the budget.
    ///
    /// A write that fails mid-stream leaves the entry pending: invisible
    /// to gets, reclaimed by the next startup sweep. No in-line retry.
    pub fn put(&mut self, key: &str, source: &mut dyn Read) -> Result<()> {
        let prior_size = self
            .meta
            .lookup_slot(key)
            .filter(|info| info.finalized)
            .map(|info| info.size_bytes)
            .unwrap_or(0);

        let slot_id = self.meta.prepare_slot(key)?;
        let written = self.blobs.write(slot_id, source).map_err(|e| {
            warn!(key = %key, slot_id, error = %e, "blob write failed; entry left pending");
            e
        })?;
        self.meta.finalize_slot(slot_id, written)?;

        self.total_bytes = self.total_bytes.saturating_sub(prior_size) + written;
        self.stats.set_total_bytes(self.total_bytes);
        debug!(key = %key, slot_id, bytes = written, "put finalized");

        if self.total_bytes > self.max_bytes {
            self.evict();
        }
        Ok(())
    }

    // == Get As File ==
    /// Looks up the finalized entry for `key`, refreshing its last-used
    /// stamp, and returns the blob file path.
    ///
    /// The path is only guaranteed to stay valid until the next put,
    /// delete, or eviction touching the slot; no lease is held.
    pub fn get_as_file(&mut self, key: &str) -> Option<PathBuf> {
        match self.meta.lookup_finalized(key) {
            Some(slot_id) => {
                self.stats.record_hit();
                Some(self.blobs.path_for(slot_id))
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes the entry for `key`, pending or finalized. Absent keys are
    /// a no-op.
    ///
    /// The blob is deleted first; the metadata row is removed only when
    /// the blob deletion succeeded, so a stuck file is retried by a later
    /// sweep instead of being orphaned.
    pub fn delete(&mut self, key: &str) {
        let Some(info) = self.meta.lookup_slot(key) else {
            return;
        };
        if !self.blobs.delete(info.slot_id) {
            warn!(key = %key, slot_id = info.slot_id,
                "could not remove blob file; will retry on next startup");
            return;
        }
        if let Err(e) = self.meta.delete_slots(&[info.slot_id]) {
            warn!(key = %key, slot_id = info.slot_id, error = %e,
                "blob removed but metadata delete failed");
        }
        if info.finalized {
            self.total_bytes = self.meta.total_finalized_size();
            self.stats.set_total_bytes(self.total_bytes);
        }
        debug!(key = %key, slot_id = info.slot_id, "entry deleted");
    }

    // == Eviction ==
    /// Removes least-recently-used finalized entries until the total size
    /// is back within budget.
    ///
    /// Runs in the same serialized turn as the put that pushed the total
    /// over budget; partial failures are logged, never surfaced.
    fn evict(&mut self) {
        let candidates = self.meta.eviction_candidates(self.max_bytes);
        if candidates.is_empty() {
            return;
        }
        let removed = self.remove_slots(&candidates);
        for _ in 0..removed {
            self.stats.record_eviction();
        }
        self.total_bytes = self.meta.total_finalized_size();
        self.stats.set_total_bytes(self.total_bytes);
        info!(
            evicted = removed,
            total_bytes = self.total_bytes,
            "eviction pass complete"
        );
    }

    // == Remove Slots ==
    /// Deletes the blob for each slot and the metadata rows of the slots
    /// whose blobs were actually removed. Returns the number removed.
    fn remove_slots(&mut self, slot_ids: &[i64]) -> usize {
        let mut cleaned = Vec::with_capacity(slot_ids.len());
        for &slot_id in slot_ids {
            if self.blobs.delete(slot_id) {
                cleaned.push(slot_id);
            } else {
                warn!(slot_id, "could not remove blob file; will retry on next startup");
            }
        }
        if let Err(e) = self.meta.delete_slots(&cleaned) {
            warn!(error = %e, "failed to delete metadata rows");
            return 0;
        }
        cleaned.len()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.meta.entry_count());
        stats.set_total_bytes(self.total_bytes);
        stats
    }

    // == Accessors ==
    /// Running total of finalized bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    // == Close ==
    /// Releases the metadata store handle.
    pub fn close(self) {
        self.meta.close();
        info!("cache closed");
    }

    #[cfg(test)]
    pub(crate) fn meta_mut(&mut self) -> &mut MetaStore {
        &mut self.meta
    }

    #[cfg(test)]
    pub(crate) fn blobs(&self) -> &BlobStore {
        &self.blobs
    }
}
