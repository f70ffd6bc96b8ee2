//! Progress reporting for uploads.
//!
//! [`ProgressCallback`] decouples progress reporting from the rendering
//! backend (an `indicatif` bar on a terminal, nothing otherwise). Each
//! transfer gets its own [`TransferProgress`] that accumulates bytes sent and
//! forwards the running total to its display.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Trait for reporting progress from long-running operations.
///
/// Implementations must be `Send + Sync` to support use across spawned
/// tokio tasks and `Arc`-based sharing.
pub trait ProgressCallback: Send + Sync {
    /// Set the total expected units of work (enables percentage/ETA).
    fn set_total(&self, total: u64);

    /// Set the current position (absolute, not delta).
    fn set_position(&self, pos: u64);

    /// Update the message displayed alongside the progress indicator.
    fn set_message(&self, msg: String);

    /// Mark progress as complete with a final message.
    fn finish(&self, msg: String);

    /// Mark progress as complete and remove the progress indicator.
    fn finish_and_clear(&self);
}

/// Creates one display per file transfer.
pub trait ProgressFactory: Send + Sync {
    /// A byte-counting display for a transfer of `total_bytes`.
    fn transfer_bar(&self, label: &str, total_bytes: u64) -> Arc<dyn ProgressCallback>;
}

/// A no-op implementation of [`ProgressCallback`] and [`ProgressFactory`]
/// that silently ignores all progress updates.
///
/// Used when output is not an interactive terminal, and in tests.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}

impl ProgressFactory for NullProgress {
    fn transfer_bar(&self, _label: &str, _total_bytes: u64) -> Arc<dyn ProgressCallback> {
        Arc::new(Self)
    }
}

/// Running byte count for a single file transfer.
///
/// Backends call [`record`](Self::record) with the number of bytes sent by
/// each request (one `PutObject`, one part). Parts may complete out of
/// order, so the total is kept atomically.
pub struct TransferProgress {
    total: u64,
    sent: AtomicU64,
    display: Arc<dyn ProgressCallback>,
}

impl TransferProgress {
    /// Starts tracking a transfer of `total` bytes.
    #[must_use]
    pub fn new(total: u64, display: Arc<dyn ProgressCallback>) -> Self {
        display.set_total(total);
        Self {
            total,
            sent: AtomicU64::new(0),
            display,
        }
    }

    /// Tracks a transfer without any display.
    #[must_use]
    pub fn silent(total: u64) -> Self {
        Self::new(total, Arc::new(NullProgress))
    }

    /// Adds `bytes` to the running total and refreshes the display.
    pub fn record(&self, bytes: u64) {
        let sent = self.sent.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.display.set_position(sent.min(self.total));
    }

    /// Bytes reported so far.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total bytes expected.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Percentage complete, `100.0` for empty files.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // display-only percentage
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.sent().min(self.total) as f64 / self.total as f64) * 100.0
    }

    /// Replaces the label next to the display.
    pub fn set_message(&self, msg: String) {
        self.display.set_message(msg);
    }

    /// Leaves the display showing `msg`.
    pub fn finish(&self, msg: String) {
        self.display.finish(msg);
    }

    /// Removes the display after a failed transfer.
    pub fn abandon(&self) {
        self.display.finish_and_clear();
    }
}
