//! Release Stager Library
//!
//! This library fetches a release archive, extracts it, and redistributes its
//! contents into a category directory according to keep and exclude glob
//! patterns.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use stager::{ReleaseConfig, Stager, StagerOptions};
//!
//! # async fn example() -> stager::Result<()> {
//! let config = ReleaseConfig::from_env("ZIP_ENV")?;
//! let stager = Stager::new(StagerOptions::new("/srv/releases"))?;
//!
//! let report = stager.run(&config, None).await?;
//! println!("Kept {} paths, removed {}", report.moved.len(), report.removed);
//! # Ok(())
//! # }
//! ```
//!
//! # Stages
//!
//! - **Update resolution**: direct URL, or a `{ success, value }` update endpoint
//! - **Fetch**: streamed download with throughput sampling
//! - **Extract**: zip extraction into `temp/`
//! - **Distribute**: concurrent moves into `dist/<category>/`, then concurrent exclusion

pub mod config;
pub mod distributor;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod http;
pub mod pipeline;
pub mod progress;
pub mod resolver;

// Re-export commonly used types for convenience
pub use config::{
    CONFIG_ENV_VAR, DownloadFailurePolicy, FetchOptions, ReleaseConfig, SHOW_PROGRESS_ENV_VAR,
    StagerOptions, progress_flag_enabled,
};
pub use distributor::{DistributionReport, Distributor, MovedPath};
pub use error::{FileOperation, Result, StageError};
pub use extractor::{ArchiveExtractor, ExtractionSummary, extract_archive};
pub use fetcher::{ArchiveFetcher, ThroughputSampler, TransferState};
pub use pipeline::{StageReport, Stager};
pub use progress::{
    IntoProgressCallback, ProgressCallback, ProgressEvent, ProgressReporter,
    TerminalProgressReporter,
};
pub use resolver::{UpdateResolver, UpdateResult};
