//! Archive fetching
//!
//! Streams a response body to disk chunk by chunk: each chunk is written
//! before the next one is pulled, then the counters are updated and the
//! progress callback is told. A [`ThroughputSampler`] measures speed on its
//! own interval while the body streams in.

pub mod transfer;

pub use transfer::{SharedTransfer, ThroughputSampler, TransferState, lock_transfer};

use futures::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{FileOperation, Result, StageError};
use crate::progress::{ProgressCallback, ProgressEvent};

/// Minimum time between two progress events
const PROGRESS_THROTTLE: Duration = Duration::from_millis(100);

/// Downloads release archives to local files
pub struct ArchiveFetcher {
    client: Client,
    sample_interval: Duration,
}

impl ArchiveFetcher {
    pub fn new(client: Client, sample_interval: Duration) -> Self {
        Self { client, sample_interval }
    }

    /// Stream `url` into `dest_path`, returning the number of bytes written
    pub async fn fetch(
        &self,
        url: &str,
        dest_path: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<u64> {
        let (bytes_written, result) = self.fetch_partial(url, dest_path, progress_callback).await;
        result.map(|_| bytes_written)
    }

    /// Like [`fetch`](Self::fetch), but reports the bytes written even on failure
    ///
    /// The destination is truncated before the request is sent, so a failed
    /// download never leaves an earlier archive in place. On failure the file
    /// is flushed and holds what was streamed before the error.
    pub async fn fetch_partial(
        &self,
        url: &str,
        dest_path: &Path,
        progress_callback: Option<ProgressCallback>,
    ) -> (u64, Result<()>) {
        let transfer: SharedTransfer = Arc::new(Mutex::new(TransferState::default()));

        let result = self
            .stream_to_file(url, dest_path, &transfer, progress_callback.as_ref())
            .await;

        let bytes_written = lock_transfer(&transfer).bytes_written;
        if let Some(ref callback) = progress_callback {
            callback(ProgressEvent::DownloadFinished {
                url: url.to_string(),
                bytes_written,
                succeeded: result.is_ok(),
            });
        }

        (bytes_written, result)
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest_path: &Path,
        transfer: &SharedTransfer,
        progress_callback: Option<&ProgressCallback>,
    ) -> Result<()> {
        debug!("Stream downloading: {} to {}", url, dest_path.display());

        let mut file = fs::File::create(dest_path).await
            .map_err(|e| StageError::FileSystem {
                path: dest_path.to_path_buf(),
                operation: FileOperation::Create,
                source: e,
            })?;

        let streamed = self.stream_body(url, dest_path, &mut file, transfer, progress_callback).await;

        // Runs after a failed chunk too, so no write is still in flight on return
        let flushed = file.flush().await
            .map_err(|e| StageError::FileSystem {
                path: dest_path.to_path_buf(),
                operation: FileOperation::Write,
                source: e,
            });
        streamed.and(flushed)?;

        if let Some(callback) = progress_callback {
            callback(ProgressEvent::DownloadProgress {
                url: url.to_string(),
                transfer: lock_transfer(transfer).clone(),
            });
        }

        debug!("Stream download completed: {} bytes", lock_transfer(transfer).bytes_written);
        Ok(())
    }

    async fn stream_body(
        &self,
        url: &str,
        dest_path: &Path,
        file: &mut fs::File,
        transfer: &SharedTransfer,
        progress_callback: Option<&ProgressCallback>,
    ) -> Result<()> {
        let response = self.client.get(url).send().await
            .map_err(|e| StageError::HttpRequest {
                url: url.to_string(),
                source: e,
            })?
            .error_for_status()
            .map_err(|e| StageError::HttpRequest {
                url: url.to_string(),
                source: e,
            })?;

        let total_size = response.content_length().filter(|&len| len > 0);
        debug!("Content length: {:?}", total_size);
        *lock_transfer(transfer) = TransferState::new(total_size);

        if let Some(callback) = progress_callback {
            callback(ProgressEvent::DownloadStarted {
                url: url.to_string(),
                total_size,
            });
        }

        // Dropped on every return below, which stops the timer
        let _sampler = ThroughputSampler::spawn(transfer.clone(), self.sample_interval);

        let mut stream = response.bytes_stream();
        let mut last_progress_time = Instant::now();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| StageError::HttpRequest {
                url: url.to_string(),
                source: e,
            })?;

            file.write_all(&chunk).await
                .map_err(|e| StageError::FileSystem {
                    path: dest_path.to_path_buf(),
                    operation: FileOperation::Write,
                    source: e,
                })?;

            let snapshot = {
                let mut state = lock_transfer(transfer);
                state.record(chunk.len() as u64);
                state.clone()
            };

            let now = Instant::now();
            if now.duration_since(last_progress_time) >= PROGRESS_THROTTLE {
                if let Some(callback) = progress_callback {
                    callback(ProgressEvent::DownloadProgress {
                        url: url.to_string(),
                        transfer: snapshot,
                    });
                }
                last_progress_time = now;
            }
        }

        Ok(())
    }
}
