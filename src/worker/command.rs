//! Worker Command Module
//!
//! The message type carried by the serializer queue. One variant per cache
//! operation; result channels ride inside the message so the worker can
//! deliver without blocking.

use std::io::Read;
use std::path::PathBuf;

use tokio::sync::oneshot;

use crate::cache::CacheStats;
use crate::error::Result;

/// A caller-supplied byte stream for put operations.
///
/// Consumed fully by the worker and dropped (released) whether the write
/// succeeds or fails.
pub type ByteSource = Box<dyn Read + Send>;

/// Type-erased parse job for get-as-object: receives the blob path (or
/// `None` for a miss) and delivers its typed result through a channel it
/// captured.
pub(crate) type ParseJob = Box<dyn FnOnce(Option<PathBuf>) + Send>;

// == Command ==
/// One queued cache operation.
pub(crate) enum Command {
    /// Store a byte source under a key; optionally notify on completion
    Put {
        key: String,
        source: ByteSource,
        notify: Option<oneshot::Sender<Result<()>>>,
    },
    /// Remove a key, pending or finalized
    Delete { key: String },
    /// Resolve a key to its blob file path
    GetFile {
        key: String,
        reply: oneshot::Sender<Option<PathBuf>>,
    },
    /// Resolve a key and run the parse job inside the worker's turn
    GetObject { key: String, job: ParseJob },
    /// Snapshot current statistics
    Stats {
        reply: oneshot::Sender<CacheStats>,
    },
    /// Drain point: close the store and stop the worker
    Shutdown,
}

impl Command {
    /// Operation name for logging.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Put { .. } => "put",
            Command::Delete { .. } => "delete",
            Command::GetFile { .. } => "get_as_file",
            Command::GetObject { .. } => "get_as_object",
            Command::Stats { .. } => "stats",
            Command::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command").field("op", &self.name()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(Command::Shutdown.name(), "shutdown");
        assert_eq!(
            Command::Delete {
                key: "k".to_string()
            }
            .name(),
            "delete"
        );
    }
}
