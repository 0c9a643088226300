//! Staging pipeline
//!
//! The call chain flows as follows:
//!
//! Stager::run
//! ↓
//! UpdateResolver (resolver.rs)
//! ↓
//! ArchiveFetcher (fetcher/mod.rs)
//! ↓
//! extract_archive (extractor.rs)
//! ↓
//! Distributor (distributor.rs)

use reqwest::Client;
use tracing::{error, info};

use crate::config::{DownloadFailurePolicy, ReleaseConfig, StagerOptions};
use crate::distributor::{Distributor, MovedPath};
use crate::error::Result;
use crate::extractor::extract_archive;
use crate::fetcher::ArchiveFetcher;
use crate::http::build_client;
use crate::progress::{IntoProgressCallback, ProgressCallback, ProgressEvent, TerminalProgressReporter};
use crate::resolver::{UpdateResolver, UpdateResult};

/// What a staging run did
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub update: UpdateResult,
    pub bytes_downloaded: u64,
    /// Set when the download failed and the run continued anyway
    pub download_error: Option<String>,
    pub extracted_entries: usize,
    pub moved: Vec<MovedPath>,
    pub removed: usize,
}

/// Runs resolve, fetch, extract and distribute in order
pub struct Stager {
    options: StagerOptions,
    client: Client,
}

impl Stager {
    pub fn new(options: StagerOptions) -> Result<Self> {
        let client = build_client(&options)?;
        Ok(Self { options, client })
    }

    /// The callback used when the caller does not supply one
    pub fn default_progress(&self) -> Option<ProgressCallback> {
        self.options
            .show_progress
            .then(|| TerminalProgressReporter::new().into_callback())
    }

    /// Stage the release described by `config`
    pub async fn run(
        &self,
        config: &ReleaseConfig,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<StageReport> {
        config.validate()?;
        let progress_callback = progress_callback.or_else(|| self.default_progress());

        let update = UpdateResolver::new(self.client.clone()).resolve(config).await?;

        let archive_path = self.options.archive_path();
        info!("Downloading {} to {}", update.url, archive_path.display());
        let fetcher = ArchiveFetcher::new(self.client.clone(), self.options.sample_interval);

        let (bytes_downloaded, fetched) = fetcher
            .fetch_partial(&update.url, &archive_path, progress_callback.clone())
            .await;
        let download_error = match fetched {
            Ok(()) => None,
            Err(e) => match self.options.download_failure_policy {
                DownloadFailurePolicy::Abort => return Err(e),
                DownloadFailurePolicy::Continue => {
                    error!(
                        "Download of {} failed after {} bytes, extracting what was written: {}",
                        update.url, bytes_downloaded, e
                    );
                    Some(e.to_string())
                }
            },
        };

        let temp_dir = self.options.temp_dir();
        info!("Extracting {} into {}", archive_path.display(), temp_dir.display());
        let summary = extract_archive(&archive_path, &temp_dir).await?;
        if let Some(ref callback) = progress_callback {
            callback(ProgressEvent::ExtractionComplete {
                archive: archive_path.clone(),
                entries: summary.entries(),
            });
        }

        let category_dir = self.options.category_dir(&config.category);
        info!("Distributing into {}", category_dir.display());
        let distribution = Distributor::new(temp_dir, category_dir)
            .with_overwrite(self.options.overwrite)
            .with_progress_callback(progress_callback)
            .distribute(&config.keep_patterns, &config.exclude_patterns)
            .await?;

        Ok(StageReport {
            update,
            bytes_downloaded,
            download_error,
            extracted_entries: summary.entries(),
            moved: distribution.moved,
            removed: distribution.removed,
        })
    }
}
