//! Blobcache - A disk-backed key-value blob cache
//!
//! Stores byte streams under string keys and retrieves them as files or
//! parsed objects, evicting least-recently-used entries once the total
//! stored size exceeds a configured budget.
//!
//! All operations are funneled through a single worker that executes them
//! strictly one at a time, in submission order, so concurrent callers never
//! need locks and a caller always reads its own writes.

pub mod cache;
pub mod config;
pub mod error;
pub mod worker;

pub use cache::CacheStats;
pub use config::Config;
pub use error::{CacheError, Result};
pub use worker::{BlobCache, ByteSource};
