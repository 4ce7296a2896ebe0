//! Progress reporting over a bounded channel.
//!
//! Long-running operations report through the [`ProgressCallback`] trait.
//! [`ChannelProgress`] is the standard implementation: it keeps cumulative
//! atomic counters and pushes [`ProgressSnapshot`]s into a bounded
//! `sync_channel` with `try_send`, so a slow consumer only loses intermediate
//! updates and never stalls the worker. The terminal [`ProgressEvent::Finished`]
//! is the one event sent with a blocking `send`.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

use serde::Serialize;

use crate::task::TaskStatus;

/// Default number of counted items between two snapshot emissions.
pub const DEFAULT_EMIT_INTERVAL: u64 = 64;

/// Pipeline phase a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Loading or validating a persisted catalog
    #[default]
    Loading,
    /// Walking a directory tree
    Walking,
    /// Hashing candidate files
    Hashing,
    /// Matching keys across catalogs
    Correlating,
}

impl Phase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Walking,
            2 => Self::Hashing,
            3 => Self::Correlating,
            _ => Self::Loading,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Loading => 0,
            Self::Walking => 1,
            Self::Hashing => 2,
            Self::Correlating => 3,
        }
    }
}

/// Progress callback for scanning and correlation phases.
///
/// Implementations must be cheap and must not block.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts. `total` is 0 when unknown.
    fn on_phase_start(&self, phase: Phase, total: u64);

    /// Called for each directory entered during a walk.
    fn on_directory(&self) {}

    /// Called for each file recorded during a walk.
    fn on_file(&self, _bytes: u64) {}

    /// Called for each file hashed (or whose stored digest was reused).
    fn on_hashed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, _phase: Phase) {}
}

/// Cumulative counters at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressSnapshot {
    /// Current phase
    pub phase: Phase,
    /// Items expected in the current phase, 0 if unknown
    pub phase_total: u64,
    /// Files recorded by walks
    pub files_seen: u64,
    /// Directories entered by walks
    pub directories_seen: u64,
    /// Bytes of files recorded by walks
    pub bytes_seen: u64,
    /// Files hashed
    pub files_hashed: u64,
    /// Bytes hashed
    pub bytes_hashed: u64,
}

/// Event delivered to the consumer of a background task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Intermediate counters
    Update(ProgressSnapshot),
    /// Terminal status; always the last event of a task
    Finished(TaskStatus),
}

/// [`ProgressCallback`] that feeds a bounded channel.
#[derive(Debug)]
pub struct ChannelProgress {
    sender: SyncSender<ProgressEvent>,
    emit_interval: u64,
    phase: AtomicU8,
    phase_total: AtomicU64,
    ticks: AtomicU64,
    files_seen: AtomicU64,
    directories_seen: AtomicU64,
    bytes_seen: AtomicU64,
    files_hashed: AtomicU64,
    bytes_hashed: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelProgress {
    /// Create a reporter and the receiving end of its channel.
    ///
    /// `capacity` is clamped to at least 1.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::sync_channel(capacity.max(1));
        let progress = Self {
            sender,
            emit_interval: DEFAULT_EMIT_INTERVAL,
            phase: AtomicU8::new(Phase::Loading.as_u8()),
            phase_total: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            files_seen: AtomicU64::new(0),
            directories_seen: AtomicU64::new(0),
            bytes_seen: AtomicU64::new(0),
            files_hashed: AtomicU64::new(0),
            bytes_hashed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        };
        (progress, receiver)
    }

    /// Emit a snapshot every `interval` counted items (minimum 1).
    #[must_use]
    pub fn with_emit_interval(mut self, interval: u64) -> Self {
        self.emit_interval = interval.max(1);
        self
    }

    /// Current counters.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: Phase::from_u8(self.phase.load(Ordering::Relaxed)),
            phase_total: self.phase_total.load(Ordering::Relaxed),
            files_seen: self.files_seen.load(Ordering::Relaxed),
            directories_seen: self.directories_seen.load(Ordering::Relaxed),
            bytes_seen: self.bytes_seen.load(Ordering::Relaxed),
            files_hashed: self.files_hashed.load(Ordering::Relaxed),
            bytes_hashed: self.bytes_hashed.load(Ordering::Relaxed),
        }
    }

    /// Number of updates dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Send the terminal status, waiting for queue space if necessary.
    ///
    /// A disconnected receiver is ignored.
    pub fn finish(&self, status: TaskStatus) {
        self.emit();
        if self.sender.send(ProgressEvent::Finished(status)).is_err() {
            log::trace!("Progress receiver gone before terminal status {status:?}");
        }
    }

    fn emit(&self) {
        match self.sender.try_send(ProgressEvent::Update(self.snapshot())) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn tick(&self) {
        let n = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if n % self.emit_interval == 0 {
            self.emit();
        }
    }
}

impl ProgressCallback for ChannelProgress {
    fn on_phase_start(&self, phase: Phase, total: u64) {
        self.phase.store(phase.as_u8(), Ordering::Relaxed);
        self.phase_total.store(total, Ordering::Relaxed);
        self.emit();
    }

    fn on_directory(&self) {
        self.directories_seen.fetch_add(1, Ordering::Relaxed);
        self.tick();
    }

    fn on_file(&self, bytes: u64) {
        self.files_seen.fetch_add(1, Ordering::Relaxed);
        self.bytes_seen.fetch_add(bytes, Ordering::Relaxed);
        self.tick();
    }

    fn on_hashed(&self, bytes: u64) {
        self.files_hashed.fetch_add(1, Ordering::Relaxed);
        self.bytes_hashed.fetch_add(bytes, Ordering::Relaxed);
        self.tick();
    }

    fn on_phase_end(&self, _phase: Phase) {
        self.emit();
    }
}
