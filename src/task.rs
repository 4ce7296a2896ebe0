//! Background tasks with cooperative cancellation.
//!
//! Scans, store loads and correlations can run on a dedicated thread through
//! [`spawn_scan`], [`spawn_load`] and [`spawn_correlate`]. Each returns a
//! [`TaskHandle`] that exposes:
//!
//! - the task's [`TaskStatus`] (`Pending → Running → Completed | Cancelled | Failed`)
//! - a [`CancelToken`] shared with the worker
//! - the receiving end of a bounded progress channel
//!
//! Cancellation is cooperative: the worker stops at its next directory or
//! file boundary, drops its open file handles and finishes with
//! [`TaskStatus::Cancelled`], which is never reported as `Failed`.
//!
//! # Usage
//!
//! ```no_run
//! use filecat::scanner::ScannerConfig;
//! use filecat::task::{spawn_scan, TaskStatus};
//! use filecat::progress::ProgressEvent;
//!
//! let handle = spawn_scan("/data".into(), ScannerConfig::default(), 64)?;
//! for event in handle.events().iter() {
//!     match event {
//!         ProgressEvent::Update(snap) => println!("{} files", snap.files_seen),
//!         ProgressEvent::Finished(status) => {
//!             println!("done: {status:?}");
//!             break;
//!         }
//!     }
//! }
//! let outcome = handle.wait()?;
//! # Ok::<(), filecat::CatalogError>(())
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::catalog::Catalog;
use crate::duplicates::{Correlation, CorrelationConfig, DuplicateEngine};
use crate::error::CatalogError;
use crate::progress::{ChannelProgress, ProgressCallback, ProgressEvent, ProgressSnapshot};
use crate::scanner::{DirectoryScanner, ScanOutcome, ScannerConfig};
use crate::store::{CatalogStore, LoadOptions, LoadOutcome};

/// How often [`TaskHandle::wait`] rechecks a worker whose terminal event was already consumed.
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Shared cooperative cancellation flag.
///
/// Cloning shares the flag. Workers poll it at their suspension points.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return [`CatalogError::Cancelled`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Cancelled`] once the token is set.
    pub fn check(&self) -> Result<(), CatalogError> {
        if self.is_cancelled() {
            Err(CatalogError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Get a clone of the underlying flag.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Lifecycle of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskStatus {
    /// Created, not yet started
    Pending,
    /// Running on its worker thread
    Running,
    /// Finished successfully
    Completed,
    /// Stopped because cancellation was requested
    Cancelled,
    /// Stopped on an error
    Failed,
}

impl TaskStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Cancelled,
            4 => Self::Failed,
            _ => Self::Pending,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
            Self::Failed => 4,
        }
    }

    /// Whether the task has stopped.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    fn of<T>(result: &Result<T, CatalogError>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(e) if e.is_cancelled() => Self::Cancelled,
            Err(_) => Self::Failed,
        }
    }
}

/// What a task body gets to work with.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Cancellation token shared with the handle
    pub cancel: CancelToken,
    /// Progress reporter feeding the handle's channel
    pub progress: Arc<ChannelProgress>,
}

impl TaskContext {
    /// The reporter as a trait object, for component configs.
    #[must_use]
    pub fn progress_callback(&self) -> Arc<dyn ProgressCallback> {
        self.progress.clone()
    }
}

/// Handle to a running background task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    status: Arc<AtomicU8>,
    cancel: CancelToken,
    progress: Arc<ChannelProgress>,
    events: Receiver<ProgressEvent>,
    join: JoinHandle<Result<T, CatalogError>>,
}

impl<T> TaskHandle<T> {
    /// Current status.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The task's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Progress events. The last event of every task is [`ProgressEvent::Finished`].
    #[must_use]
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Latest counters, independent of what the channel delivered.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Wait for the task and return its result.
    ///
    /// Undelivered progress events are drained and discarded so the worker
    /// can always deliver its terminal status.
    ///
    /// # Errors
    ///
    /// Returns the task's error, [`CatalogError::Cancelled`] if it was
    /// cancelled, or an [`CatalogError::IoFailure`] if the worker panicked.
    pub fn wait(self) -> Result<T, CatalogError> {
        loop {
            match self.events.recv_timeout(DRAIN_POLL) {
                Ok(ProgressEvent::Finished(_)) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(ProgressEvent::Update(_)) => {}
                Err(RecvTimeoutError::Timeout) => {
                    if self.join.is_finished() {
                        break;
                    }
                }
            }
        }
        match self.join.join() {
            Ok(result) => result,
            Err(_) => {
                self.status
                    .store(TaskStatus::Failed.as_u8(), Ordering::SeqCst);
                Err(CatalogError::IoFailure {
                    path: PathBuf::new(),
                    source: io::Error::other("background task panicked"),
                })
            }
        }
    }
}

/// Run `work` on a new named thread.
///
/// `capacity` bounds the progress channel (minimum 1).
///
/// # Errors
///
/// Returns [`CatalogError::IoFailure`] if the thread cannot be spawned.
pub fn spawn<T, F>(name: &str, capacity: usize, work: F) -> Result<TaskHandle<T>, CatalogError>
where
    T: Send + 'static,
    F: FnOnce(&TaskContext) -> Result<T, CatalogError> + Send + 'static,
{
    let (progress, events) = ChannelProgress::channel(capacity);
    let ctx = TaskContext {
        cancel: CancelToken::new(),
        progress: Arc::new(progress),
    };
    let status = Arc::new(AtomicU8::new(TaskStatus::Pending.as_u8()));

    let handle_cancel = ctx.cancel.clone();
    let handle_progress = Arc::clone(&ctx.progress);
    let worker_status = Arc::clone(&status);
    let task_name = name.to_string();

    let join = thread::Builder::new()
        .name(format!("filecat-{name}"))
        .spawn(move || {
            let result = if ctx.cancel.is_cancelled() {
                Err(CatalogError::Cancelled)
            } else {
                worker_status.store(TaskStatus::Running.as_u8(), Ordering::SeqCst);
                log::debug!("Task {task_name} started");
                work(&ctx)
            };
            let final_status = TaskStatus::of(&result);
            match &result {
                Err(e) if !e.is_cancelled() => log::warn!("Task {task_name} failed: {e}"),
                _ => log::debug!("Task {task_name} finished: {final_status:?}"),
            }
            worker_status.store(final_status.as_u8(), Ordering::SeqCst);
            ctx.progress.finish(final_status);
            result
        })
        .map_err(|e| CatalogError::IoFailure {
            path: PathBuf::new(),
            source: e,
        })?;

    Ok(TaskHandle {
        status,
        cancel: handle_cancel,
        progress: handle_progress,
        events,
        join,
    })
}

/// Scan `root` in the background.
///
/// # Errors
///
/// Returns an error only if the worker thread cannot be spawned.
pub fn spawn_scan(
    root: PathBuf,
    config: ScannerConfig,
    capacity: usize,
) -> Result<TaskHandle<ScanOutcome>, CatalogError> {
    spawn("scan", capacity, move |ctx| {
        DirectoryScanner::new(&root, config)
            .with_cancel_token(ctx.cancel.clone())
            .with_progress(ctx.progress_callback())
            .scan()
    })
}

/// Load or rebuild the catalog of `root` in the background.
///
/// # Errors
///
/// Returns an error only if the worker thread cannot be spawned.
pub fn spawn_load(
    store: Arc<CatalogStore>,
    root: PathBuf,
    options: LoadOptions,
    capacity: usize,
) -> Result<TaskHandle<LoadOutcome>, CatalogError> {
    spawn("load", capacity, move |ctx| {
        store.load_or_rebuild_with(&root, options, Some(&ctx.cancel), Some(ctx.progress_callback()))
    })
}

/// Correlate `source` against `destinations` in the background.
///
/// Any token or callback already in `config` is replaced by the task's own.
///
/// # Errors
///
/// Returns an error only if the worker thread cannot be spawned.
pub fn spawn_correlate(
    source: Arc<Catalog>,
    destinations: Vec<Arc<Catalog>>,
    config: CorrelationConfig,
    capacity: usize,
) -> Result<TaskHandle<Correlation>, CatalogError> {
    spawn("correlate", capacity, move |ctx| {
        let config = config
            .with_cancel_token(ctx.cancel.clone())
            .with_progress(ctx.progress_callback());
        let destinations: Vec<&Catalog> = destinations.iter().map(Arc::as_ref).collect();
        DuplicateEngine::new(config).correlate(&source, &destinations)
    })
}
