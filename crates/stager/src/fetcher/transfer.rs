//! Transfer counters and the periodic throughput sampler

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Byte counters for one download, mutated while the body streams in
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferState {
    pub bytes_written: u64,
    /// `None` when the server sent no usable `content-length`
    pub total_bytes: Option<u64>,
    /// `bytes_written` at the previous sampling tick
    pub last_sample_bytes: u64,
    /// Throughput measured at the last tick, in bytes per second
    pub speed_bps: f64,
}

impl TransferState {
    pub fn new(total_bytes: Option<u64>) -> Self {
        Self {
            total_bytes: total_bytes.filter(|&t| t > 0),
            ..Self::default()
        }
    }

    /// Account for a chunk that has been written to disk
    pub fn record(&mut self, bytes: u64) {
        self.bytes_written += bytes;
    }

    /// Close a sampling window of length `interval` and reset the baseline
    pub fn sample(&mut self, interval: Duration) -> f64 {
        let delta = self.bytes_written.saturating_sub(self.last_sample_bytes);
        let seconds = interval.as_secs_f64();
        self.speed_bps = if seconds > 0.0 { delta as f64 / seconds } else { 0.0 };
        self.last_sample_bytes = self.bytes_written;
        self.speed_bps
    }

    pub fn speed_kbps(&self) -> f64 {
        self.speed_bps / 1024.0
    }

    pub fn percent(&self) -> Option<f64> {
        self.total_bytes
            .map(|total| self.bytes_written as f64 * 100.0 / total as f64)
    }
}

/// Transfer state shared between the streaming loop and the sampler
pub type SharedTransfer = Arc<Mutex<TransferState>>;

/// Lock the shared state; a panicked holder cannot leave the counters inconsistent
pub fn lock_transfer(shared: &SharedTransfer) -> std::sync::MutexGuard<'_, TransferState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Samples throughput on a fixed interval until dropped
///
/// Dropping the sampler aborts its task, so the timer never outlives the
/// download that started it.
#[derive(Debug)]
pub struct ThroughputSampler {
    handle: JoinHandle<()>,
}

impl ThroughputSampler {
    pub fn spawn(state: SharedTransfer, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                lock_transfer(&state).sample(interval);
            }
        });
        Self { handle }
    }
}

impl Drop for ThroughputSampler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
