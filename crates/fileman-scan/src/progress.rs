//! Scan progress reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use fileman_core::{Entry, EntryKind};

/// Entries recorded between two progress updates.
const PUBLISH_EVERY: u64 = 1000;

/// Progress information during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    /// Number of files recorded so far.
    pub files_scanned: u64,
    /// Number of directories recorded so far.
    pub dirs_scanned: u64,
    /// Number of symlinks recorded so far.
    pub symlinks_scanned: u64,
    /// Total file bytes recorded so far.
    pub bytes_scanned: u64,
    /// Relpath of the most recent entry.
    pub current_path: String,
    /// Number of warnings encountered.
    pub warnings_count: u64,
    /// Time elapsed since scan started.
    pub elapsed: Duration,
    /// Whether this is the last update of the scan.
    pub finished: bool,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            files_scanned: 0,
            dirs_scanned: 0,
            symlinks_scanned: 0,
            bytes_scanned: 0,
            current_path: String::new(),
            warnings_count: 0,
            elapsed: Duration::ZERO,
            finished: false,
        }
    }

    /// Calculate scan rate in entries per second.
    pub fn entries_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.total_items() as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Get total items scanned.
    pub fn total_items(&self) -> u64 {
        self.files_scanned + self.dirs_scanned + self.symlinks_scanned
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared progress counters that publish on a broadcast channel.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    tx: broadcast::Sender<ScanProgress>,
    start_time: Instant,
    files_scanned: AtomicU64,
    dirs_scanned: AtomicU64,
    symlinks_scanned: AtomicU64,
    bytes_scanned: AtomicU64,
    warnings_count: AtomicU64,
    total: AtomicU64,
}

impl ProgressTracker {
    pub fn new(tx: broadcast::Sender<ScanProgress>) -> Self {
        Self {
            tx,
            start_time: Instant::now(),
            files_scanned: AtomicU64::new(0),
            dirs_scanned: AtomicU64::new(0),
            symlinks_scanned: AtomicU64::new(0),
            bytes_scanned: AtomicU64::new(0),
            warnings_count: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Count an entry, publishing every [`PUBLISH_EVERY`] entries.
    pub fn record_entry(&self, entry: &Entry) {
        self.record(entry.kind(), entry.size().unwrap_or(0), entry.relpath());
    }

    pub fn record(&self, kind: EntryKind, size: u64, relpath: &str) {
        let counter = match kind {
            EntryKind::File => {
                self.bytes_scanned.fetch_add(size, Ordering::Relaxed);
                &self.files_scanned
            }
            EntryKind::Directory => &self.dirs_scanned,
            EntryKind::Symlink => &self.symlinks_scanned,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        // Exactly one recorder sees each multiple
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
        if total % PUBLISH_EVERY == 0 {
            self.publish(relpath, false);
        }
    }

    pub fn record_warning(&self) {
        self.warnings_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the final update.
    pub fn finish(&self) {
        self.publish("", true);
    }

    pub fn snapshot(&self, current_path: &str, finished: bool) -> ScanProgress {
        ScanProgress {
            files_scanned: self.files_scanned.load(Ordering::Relaxed),
            dirs_scanned: self.dirs_scanned.load(Ordering::Relaxed),
            symlinks_scanned: self.symlinks_scanned.load(Ordering::Relaxed),
            bytes_scanned: self.bytes_scanned.load(Ordering::Relaxed),
            current_path: current_path.to_string(),
            warnings_count: self.warnings_count.load(Ordering::Relaxed),
            elapsed: self.start_time.elapsed(),
            finished,
        }
    }

    fn publish(&self, current_path: &str, finished: bool) {
        // No subscribers is not an error
        let _ = self.tx.send(self.snapshot(current_path, finished));
    }
}
