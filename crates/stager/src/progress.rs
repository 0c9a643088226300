//! Progress tracking and reporting for staging runs

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use crate::fetcher::TransferState;

/// Progress callback for staging operations
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Events emitted while a release is staged
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    DownloadStarted {
        url: String,
        total_size: Option<u64>,
    },
    DownloadProgress {
        url: String,
        transfer: TransferState,
    },
    /// Sent on every exit path of a download, successful or not
    DownloadFinished {
        url: String,
        bytes_written: u64,
        succeeded: bool,
    },
    ExtractionComplete {
        archive: PathBuf,
        entries: usize,
    },
    PatternKept {
        pattern: String,
        matched: usize,
    },
    PatternExcluded {
        pattern: String,
        removed: usize,
    },
    Warning {
        message: String,
    },
}

/// Trait for progress reporting with more granular control
pub trait ProgressReporter: Send + Sync {
    fn on_download_started(&self, _url: &str, _total_size: Option<u64>) {}
    fn on_download_progress(&self, _url: &str, _transfer: &TransferState) {}
    fn on_download_finished(&self, _url: &str, _bytes_written: u64, _succeeded: bool) {}
    fn on_extraction_complete(&self, _archive: &std::path::Path, _entries: usize) {}
    fn on_pattern_kept(&self, _pattern: &str, _matched: usize) {}
    fn on_pattern_excluded(&self, _pattern: &str, _removed: usize) {}
    fn on_warning(&self, _message: &str) {}
}

/// Extension trait to convert ProgressReporter to ProgressCallback
pub trait IntoProgressCallback {
    fn into_callback(self) -> ProgressCallback;
}

impl<T: ProgressReporter + 'static> IntoProgressCallback for T {
    fn into_callback(self) -> ProgressCallback {
        Arc::new(move |event| match event {
            ProgressEvent::DownloadStarted { url, total_size } => {
                self.on_download_started(&url, total_size);
            }
            ProgressEvent::DownloadProgress { url, transfer } => {
                self.on_download_progress(&url, &transfer);
            }
            ProgressEvent::DownloadFinished { url, bytes_written, succeeded } => {
                self.on_download_finished(&url, bytes_written, succeeded);
            }
            ProgressEvent::ExtractionComplete { archive, entries } => {
                self.on_extraction_complete(&archive, entries);
            }
            ProgressEvent::PatternKept { pattern, matched } => {
                self.on_pattern_kept(&pattern, matched);
            }
            ProgressEvent::PatternExcluded { pattern, removed } => {
                self.on_pattern_excluded(&pattern, removed);
            }
            ProgressEvent::Warning { message } => {
                self.on_warning(&message);
            }
        })
    }
}

/// Redraws a four-line transfer block in place on stdout
#[derive(Debug, Default)]
pub struct TerminalProgressReporter {
    /// Number of lines currently on screen that the next redraw replaces
    drawn_lines: Mutex<usize>,
}

impl TerminalProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The block shown for one transfer snapshot
    pub fn render(transfer: &TransferState) -> String {
        let total = transfer
            .total_bytes
            .map(|t| t.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let percent = transfer
            .percent()
            .map(|p| format!("{p:.4}"))
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Current:  {:>16}\nTotal:    {:>16}\nProgress: {:>16} %\nSpeed:    {:>16.2} KB / s\n",
            transfer.bytes_written,
            total,
            percent,
            transfer.speed_kbps(),
        )
    }
}

impl ProgressReporter for TerminalProgressReporter {
    fn on_download_progress(&self, _url: &str, transfer: &TransferState) {
        let block = Self::render(transfer);
        let mut drawn = self.drawn_lines.lock().unwrap_or_else(PoisonError::into_inner);

        let mut stdout = io::stdout().lock();
        if *drawn > 0 {
            // Move back to the top of the previous block and clear it
            let _ = write!(stdout, "\x1b[{}F\x1b[0J", *drawn);
        }
        let _ = write!(stdout, "{block}");
        let _ = stdout.flush();
        *drawn = block.lines().count();
    }

    fn on_download_finished(&self, _url: &str, _bytes_written: u64, _succeeded: bool) {
        // Leave the last block on screen; the next transfer starts below it
        *self.drawn_lines.lock().unwrap_or_else(PoisonError::into_inner) = 0;
    }
}
