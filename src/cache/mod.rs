//! Cache Module
//!
//! Disk-backed caching: durable key-to-slot metadata, blob files on disk,
//! and the engine that orchestrates put/get/delete with LRU eviction.

mod blob;
mod engine;
mod meta;
mod stats;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use blob::{BlobStore, BLOB_EXT};
pub use engine::CacheEngine;
pub use meta::{MetaStore, SlotInfo};
pub use stats::CacheStats;
