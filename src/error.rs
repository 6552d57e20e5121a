//! Error types for the blob cache
//!
//! Provides unified error handling using thiserror.
//!
//! Not-found is deliberately absent from this enum: a missing key is a
//! first-class empty result (`Option::None`), never an error.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the blob cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Metadata store failure (schema, statement, or transaction level)
    #[error("Metadata store error: {0}")]
    Metadata(#[from] rusqlite::Error),

    /// Blob file I/O failure
    #[error("Blob I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller-supplied parse function failed; cache state is untouched
    #[error("Parse error: {0}")]
    Parse(#[source] anyhow::Error),

    /// The cache has been shut down and no longer accepts operations
    #[error("Cache is shut down")]
    Closed,
}

// == Result Type Alias ==
/// Convenience Result type for the blob cache.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Closed;
        assert_eq!(err.to_string(), "Cache is shut down");

        let err: CacheError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_parse_error_wraps_cause() {
        let err = CacheError::Parse(anyhow::anyhow!("bad payload"));
        assert!(err.to_string().contains("bad payload"));
    }
}
