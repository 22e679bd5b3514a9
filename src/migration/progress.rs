//! Migration progress reporting
//!
//! Progress is published on a bounded `tokio::sync::mpsc` channel with
//! `try_send`. A full or closed channel drops the update, so a slow or absent
//! consumer never holds up the copy.
//!
//! Within one operation the reported percentage never decreases; a new
//! operation starts again at 0.

use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, error::TrySendError};

/// Operation name for the stable-store copy
pub const OP_STABLE_STORE: &str = "stable_store";

/// Operation name for the log copy
pub const OP_LOG_STORE: &str = "log_store";

/// Point-in-time progress of one operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Operation being reported on
    pub op: &'static str,
    /// Completion percentage (0.0–100.0)
    pub progress: f64,
}

/// Create a progress channel holding at most `capacity` undelivered updates.
pub fn channel(capacity: usize) -> (mpsc::Sender<ProgressUpdate>, mpsc::Receiver<ProgressUpdate>) {
    mpsc::channel(capacity.max(1))
}

/// Decides when to publish progress and publishes it without blocking.
#[derive(Debug)]
pub struct ProgressNotifier {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    /// Minimum advance between two updates, in percent
    step_pct: f64,
    /// Maximum time between two updates while progress advances
    interval: Duration,
    op: Option<&'static str>,
    last_pct: f64,
    last_emit: Instant,
    dropped: u64,
}

impl ProgressNotifier {
    /// Notifier publishing on `tx`.
    pub fn new(tx: mpsc::Sender<ProgressUpdate>, step_pct: f64, interval: Duration) -> Self {
        Self {
            tx: Some(tx),
            step_pct,
            interval,
            op: None,
            last_pct: 0.0,
            last_emit: Instant::now(),
            dropped: 0,
        }
    }

    /// Notifier with nobody listening.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            step_pct: 100.0,
            interval: Duration::MAX,
            op: None,
            last_pct: 0.0,
            last_emit: Instant::now(),
            dropped: 0,
        }
    }

    /// Start a new operation at 0%.
    pub fn begin(&mut self, op: &'static str) {
        self.op = Some(op);
        self.publish(op, 0.0);
    }

    /// Record that `done` of `total` items of the current operation are done.
    pub fn advance(&mut self, done: u64, total: u64) {
        let Some(op) = self.op else {
            return;
        };
        if total == 0 {
            return;
        }

        let pct = (done as f64 / total as f64 * 100.0).min(100.0);
        if pct <= self.last_pct {
            return;
        }

        if pct >= 100.0
            || pct - self.last_pct >= self.step_pct
            || self.last_emit.elapsed() >= self.interval
        {
            self.publish(op, pct);
        }
    }

    /// Mark the current operation complete.
    pub fn finish(&mut self) {
        if let Some(op) = self.op {
            if self.last_pct < 100.0 {
                self.publish(op, 100.0);
            }
        }
    }

    /// Updates dropped because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn publish(&mut self, op: &'static str, progress: f64) {
        self.last_pct = progress;
        self.last_emit = Instant::now();

        let Some(tx) = self.tx.as_ref() else {
            return;
        };
        match tx.try_send(ProgressUpdate { op, progress }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.dropped += 1,
            // Receiver is gone; stop building updates nobody reads.
            Err(TrySendError::Closed(_)) => self.tx = None,
        }
    }
}
