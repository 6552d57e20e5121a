//! Worker Module
//!
//! The task serializer and the public cache handle. Every operation is
//! enqueued onto one mpsc channel and executed strictly one at a time, in
//! submission order, by a single background worker. Mutual exclusion is
//! structural: the engine needs no locks because only the worker touches
//! it.
//!
//! Result delivery happens through oneshot channels awaited on the
//! caller's own task; sending a result never blocks the worker.

mod command;

pub use command::ByteSource;

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheEngine, CacheStats};
use crate::config::Config;
use crate::error::{CacheError, Result};
use command::Command;

// == Blob Cache Handle ==
/// Asynchronous handle to a disk-backed blob cache.
///
/// Cloning is not supported; share the handle behind an `Arc` if multiple
/// tasks submit operations. Operations on the same key observe effects in
/// submission order regardless of which task submitted them.
#[derive(Debug)]
pub struct BlobCache {
    tx: mpsc::UnboundedSender<Command>,
    /// Worker join handle, taken by `shutdown_and_wait`
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl BlobCache {
    // == Open ==
    /// Opens (or restores) the cache described by `config` and spawns its
    /// worker. The startup recovery sweep runs as the worker's first
    /// action, before any queued operation.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: Config) -> Result<Self> {
        let engine = CacheEngine::open(&config)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::task::spawn_blocking(move || run_worker(engine, rx));
        Ok(Self {
            tx,
            worker: Mutex::new(Some(worker)),
            closed: AtomicBool::new(false),
        })
    }

    // == Put ==
    /// Enqueues a put for `key`, fire-and-forget. The source is consumed
    /// on the worker; failures are logged, not reported.
    pub fn put(&self, key: impl Into<String>, source: ByteSource) -> Result<()> {
        self.send(Command::Put {
            key: key.into(),
            source,
            notify: None,
        })
    }

    /// Convenience put for an in-memory payload.
    pub fn put_bytes(&self, key: impl Into<String>, payload: Vec<u8>) -> Result<()> {
        self.put(key, Box::new(Cursor::new(payload)))
    }

    /// Enqueues a put and waits until the write and its size accounting
    /// (including any triggered eviction) have completed.
    pub async fn put_and_wait(&self, key: impl Into<String>, source: ByteSource) -> Result<()> {
        let (notify_tx, notify_rx) = oneshot::channel();
        self.send(Command::Put {
            key: key.into(),
            source,
            notify: Some(notify_tx),
        })?;
        notify_rx.await.map_err(|_| CacheError::Closed)?
    }

    // == Delete ==
    /// Enqueues a delete for `key`, fire-and-forget. Absent keys are a
    /// no-op.
    pub fn delete(&self, key: impl Into<String>) -> Result<()> {
        self.send(Command::Delete { key: key.into() })
    }

    // == Get As File ==
    /// Resolves `key` to its blob file path, refreshing its last-used
    /// stamp. Returns `None` when the key is absent or its write never
    /// finalized.
    ///
    /// A subsequent put, delete, or eviction for the same slot may replace
    /// or remove the file; no lease is held. Use [`get_as_object`] when
    /// the bytes must be read under the cache's consistency guarantee.
    ///
    /// [`get_as_object`]: BlobCache::get_as_object
    pub async fn get_as_file(&self, key: impl Into<String>) -> Result<Option<PathBuf>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::GetFile {
            key: key.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| CacheError::Closed)
    }

    // == Get As Object ==
    /// Resolves `key` and runs `parse` against the blob file inside the
    /// worker's turn, so the file cannot change underneath it. This blocks
    /// every queued operation until parsing completes - a deliberate
    /// throughput tradeoff for consistency.
    ///
    /// Exactly one outcome resolves: `Ok(Some(value))` on parse success,
    /// `Ok(None)` when the key is absent (not an error), or
    /// `Err(CacheError::Parse)` when the parse function fails. A parse
    /// failure leaves the entry cached and valid.
    pub async fn get_as_object<T, F>(&self, key: impl Into<String>, parse: F) -> Result<Option<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> anyhow::Result<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<Option<T>>>();
        let job: command::ParseJob = Box::new(move |path| {
            let outcome = match path {
                Some(path) => parse(&path).map(Some).map_err(CacheError::Parse),
                None => Ok(None),
            };
            let _ = reply_tx.send(outcome);
        });
        self.send(Command::GetObject {
            key: key.into(),
            job,
        })?;
        reply_rx.await.map_err(|_| CacheError::Closed)?
    }

    // == Stats ==
    /// Snapshots current cache statistics, in queue order.
    pub async fn stats(&self) -> Result<CacheStats> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Stats { reply: reply_tx })?;
        reply_rx.await.map_err(|_| CacheError::Closed)
    }

    // == Shutdown ==
    /// Stops accepting new operations. Already-queued operations drain in
    /// order, then the worker releases the metadata store and exits.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // The drain marker rides the queue like any other operation
        let _ = self.tx.send(Command::Shutdown);
    }

    /// Shuts down and waits for the worker to finish draining, up to
    /// `timeout`. A timeout is logged and otherwise non-fatal; the worker
    /// keeps draining in the background.
    pub async fn shutdown_and_wait(&self, timeout: Duration) {
        self.shutdown();
        let handle = self.worker.lock().expect("worker mutex poisoned").take();
        let Some(handle) = handle else {
            return;
        };
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(())) => info!("cache worker drained and stopped"),
            Ok(Err(e)) => warn!(error = %e, "cache worker panicked"),
            Err(_) => warn!(?timeout, "timed out waiting for cache worker to drain"),
        }
    }

    // == Internal ==
    fn send(&self, command: Command) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }
        self.tx.send(command).map_err(|_| CacheError::Closed)
    }
}

// == Worker Loop ==
/// Drains the queue one command at a time in FIFO order. Runs the startup
/// recovery sweep first, closes the engine on exit.
fn run_worker(mut engine: CacheEngine, mut rx: mpsc::UnboundedReceiver<Command>) {
    engine.recover();

    while let Some(command) = rx.blocking_recv() {
        debug!(op = command.name(), "executing");
        match command {
            Command::Put {
                key,
                mut source,
                notify,
            } => {
                let result = engine.put(&key, &mut *source);
                if let Err(e) = &result {
                    warn!(key = %key, error = %e, "put failed");
                }
                if let Some(notify) = notify {
                    let _ = notify.send(result);
                }
            }
            Command::Delete { key } => engine.delete(&key),
            Command::GetFile { key, reply } => {
                let _ = reply.send(engine.get_as_file(&key));
            }
            Command::GetObject { key, job } => {
                // Parse runs inside this turn; the blob cannot change
                // until the job returns
                let path = engine.get_as_file(&key);
                job(path);
            }
            Command::Stats { reply } => {
                let _ = reply.send(engine.stats());
            }
            Command::Shutdown => break,
        }
    }
    engine.close();
}
