//! Metadata Store Module
//!
//! Durable key-to-slot mapping backed by SQLite. One row per cache key,
//! tracking the slot id (which doubles as the blob filename stem), the
//! recorded size, the finalization flag, and usage timestamps.
//!
//! The store only persists what the engine tells it; all mutation arrives
//! through the single-writer worker, so a single statement per operation is
//! enough for atomicity.
//!
//! Read failures never propagate: lookups degrade to "absent" and size
//! aggregates to zero, with a warning logged. A cache miss is always a safe
//! fallback for a caller.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::Result;

/// A row of the metadata table, as seen by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// Stable slot id, unique and immutable once assigned
    pub slot_id: i64,
    /// Whether the blob write for this slot has completed
    pub finalized: bool,
    /// Recorded blob size; trustworthy only when finalized
    pub size_bytes: u64,
}

// == Metadata Store ==
/// SQLite-backed metadata store for cache entries.
#[derive(Debug)]
pub struct MetaStore {
    conn: Connection,
    /// Last issued timestamp, used to keep stamps strictly increasing even
    /// when the millisecond clock collides under bulk writes
    last_stamp: i64,
}

impl MetaStore {
    // == Constructors ==
    /// Opens (or creates) the metadata database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Opens an in-memory metadata store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                slot_id      INTEGER PRIMARY KEY,
                key          TEXT NOT NULL UNIQUE,
                size_bytes   INTEGER NOT NULL DEFAULT 0,
                finalized    INTEGER NOT NULL DEFAULT 0,
                last_used_at INTEGER NOT NULL,
                created_at   INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_lru
                ON entries (finalized, last_used_at);",
        )?;
        Ok(Self {
            conn,
            last_stamp: 0,
        })
    }

    // == Timestamps ==
    /// Returns a millisecond Unix timestamp, strictly greater than any
    /// stamp previously issued by this store instance.
    fn next_stamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let stamp = now.max(self.last_stamp + 1);
        self.last_stamp = stamp;
        stamp
    }

    // == Prepare Slot ==
    /// Atomically assigns or reuses the slot for `key`.
    ///
    /// A key that already has a row (finalized or not) keeps its slot id,
    /// so an overwrite replaces the old blob file in place. The row is
    /// reset to `finalized = 0`, `size_bytes = 0`, and both timestamps are
    /// stamped to now.
    pub fn prepare_slot(&mut self, key: &str) -> Result<i64> {
        let stamp = self.next_stamp();
        // The subquery yields NULL for a new key, letting SQLite assign a
        // fresh rowid; an existing key keeps its slot id.
        self.conn.execute(
            "INSERT OR REPLACE INTO entries
                 (slot_id, key, size_bytes, finalized, last_used_at, created_at)
             VALUES
                 ((SELECT slot_id FROM entries WHERE key = ?1), ?1, 0, 0, ?2, ?2)",
            params![key, stamp],
        )?;
        let slot_id = self.conn.query_row(
            "SELECT slot_id FROM entries WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(slot_id)
    }

    // == Finalize Slot ==
    /// Marks the slot finalized and records the real blob size.
    pub fn finalize_slot(&mut self, slot_id: i64, size_bytes: u64) -> Result<()> {
        self.conn.execute(
            "UPDATE entries SET finalized = 1, size_bytes = ?1 WHERE slot_id = ?2",
            params![size_bytes as i64, slot_id],
        )?;
        Ok(())
    }

    // == Lookup Finalized ==
    /// Returns the slot id for a finalized entry, refreshing its
    /// `last_used_at` stamp. Unfinalized or absent keys both yield `None`.
    ///
    /// Read failures are logged and reported as `None`.
    pub fn lookup_finalized(&mut self, key: &str) -> Option<i64> {
        let found = self
            .conn
            .query_row(
                "SELECT slot_id FROM entries WHERE key = ?1 AND finalized = 1",
                params![key],
                |row| row.get::<_, i64>(0),
            )
            .optional();
        let slot_id = match found {
            Ok(slot_id) => slot_id?,
            Err(e) => {
                warn!(key = %key, error = %e, "metadata lookup failed; treating as absent");
                return None;
            }
        };
        let stamp = self.next_stamp();
        if let Err(e) = self.conn.execute(
            "UPDATE entries SET last_used_at = ?1 WHERE key = ?2",
            params![stamp, key],
        ) {
            warn!(key = %key, error = %e, "failed to refresh last-used stamp");
        }
        Some(slot_id)
    }

    // == Lookup Slot ==
    /// Returns the row for `key` regardless of finalization state.
    ///
    /// Used by delete, which must see pending entries too. Read failures
    /// are logged and reported as `None`.
    pub fn lookup_slot(&self, key: &str) -> Option<SlotInfo> {
        let found = self
            .conn
            .query_row(
                "SELECT slot_id, finalized, size_bytes FROM entries WHERE key = ?1",
                params![key],
                |row| {
                    Ok(SlotInfo {
                        slot_id: row.get(0)?,
                        finalized: row.get::<_, i64>(1)? != 0,
                        size_bytes: row.get::<_, i64>(2)?.max(0) as u64,
                    })
                },
            )
            .optional();
        match found {
            Ok(info) => info,
            Err(e) => {
                warn!(key = %key, error = %e, "metadata lookup failed; treating as absent");
                None
            }
        }
    }

    // == Total Finalized Size ==
    /// Sum of `size_bytes` over finalized entries.
    ///
    /// Returns 0 if the table is empty or the read fails; this value is
    /// advisory and reconciled against the blob store, never fatal.
    pub fn total_finalized_size(&self) -> u64 {
        let total = self.conn.query_row(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM entries WHERE finalized = 1",
            [],
            |row| row.get::<_, i64>(0),
        );
        match total {
            Ok(total) => total.max(0) as u64,
            Err(e) => {
                warn!(error = %e, "failed to read total finalized size; reporting 0");
                0
            }
        }
    }

    // == Entry Count ==
    /// Number of finalized entries currently present.
    pub fn entry_count(&self) -> u64 {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE finalized = 1",
            [],
            |row| row.get::<_, i64>(0),
        );
        match count {
            Ok(count) => count.max(0) as u64,
            Err(e) => {
                warn!(error = %e, "failed to count entries; reporting 0");
                0
            }
        }
    }

    // == List Unfinalized ==
    /// Slot ids of entries whose write never completed.
    ///
    /// Consumed once at startup by the recovery sweep. Read failures are
    /// logged and yield an empty list (the sweep retries next startup).
    pub fn list_unfinalized(&self) -> Vec<i64> {
        let query = || -> rusqlite::Result<Vec<i64>> {
            let mut stmt = self
                .conn
                .prepare("SELECT slot_id FROM entries WHERE finalized = 0")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        };
        match query() {
            Ok(slots) => slots,
            Err(e) => {
                warn!(error = %e, "failed to list unfinalized entries");
                Vec::new()
            }
        }
    }

    // == Delete Slots ==
    /// Removes the rows for the given slot ids. Idempotent: absent ids are
    /// silently skipped.
    pub fn delete_slots(&mut self, slot_ids: &[i64]) -> Result<()> {
        if slot_ids.is_empty() {
            return Ok(());
        }
        let id_list = slot_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.conn.execute(
            &format!("DELETE FROM entries WHERE slot_id IN ({id_list})"),
            [],
        )?;
        Ok(())
    }

    // == Eviction Candidates ==
    /// Walks finalized entries from most to least recently used,
    /// accumulating sizes, and returns every slot id encountered after the
    /// running sum exceeds `budget` - the least-recently-used tail whose
    /// removal brings the total back within budget.
    ///
    /// Ties on `last_used_at` break on `created_at` (then slot id), newest
    /// first, so the oldest-created entry is evicted first among ties and
    /// eviction stays deterministic.
    pub fn eviction_candidates(&self, budget: u64) -> Vec<i64> {
        let query = || -> rusqlite::Result<Vec<i64>> {
            let mut stmt = self.conn.prepare(
                "SELECT slot_id, size_bytes FROM entries WHERE finalized = 1
                 ORDER BY last_used_at DESC, created_at DESC, slot_id DESC",
            )?;
            let mut rows = stmt.query([])?;
            let mut candidates = Vec::new();
            let mut cumulative: u64 = 0;
            while let Some(row) = rows.next()? {
                let slot_id: i64 = row.get(0)?;
                let size: i64 = row.get(1)?;
                cumulative += size.max(0) as u64;
                if cumulative > budget {
                    candidates.push(slot_id);
                }
            }
            Ok(candidates)
        };
        match query() {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "failed to compute eviction candidates");
                Vec::new()
            }
        }
    }

    // == Close ==
    /// Closes the underlying connection, logging (not propagating) any
    /// failure to flush.
    pub fn close(self) {
        if let Err((_, e)) = self.conn.close() {
            warn!(error = %e, "failed to close metadata store cleanly");
        }
    }
}
