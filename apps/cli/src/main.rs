use anyhow::Context;
use clap::Parser;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

use stager::{
    CONFIG_ENV_VAR, DownloadFailurePolicy, ReleaseConfig, SHOW_PROGRESS_ENV_VAR, Stager,
    StagerOptions, progress_flag_enabled,
};

/// Fetch a release archive and stage its contents into dist/<category>
#[derive(Debug, Parser)]
#[command(name = "stager", version)]
struct Cli {
    /// Environment variable holding the base64-encoded JSON configuration
    #[arg(long, default_value = CONFIG_ENV_VAR)]
    config_env: String,

    /// Directory holding the archive, temp/ and dist/ (defaults to the current directory)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// File name the archive is downloaded to
    #[arg(long, default_value = "file.zip")]
    archive_name: String,

    /// Redraw transfer progress in place (also enabled by SHOW_PROGRESS)
    #[arg(long)]
    show_progress: bool,

    /// Log a failed download and extract whatever was written instead of stopping
    #[arg(long)]
    continue_on_download_error: bool,

    /// Replace destinations that already exist in dist/<category>
    #[arg(long)]
    overwrite: bool,

    /// Request timeout in seconds (no timeout by default)
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

impl Cli {
    fn options(&self) -> StagerOptions {
        self.options_with_progress_flag(std::env::var_os(SHOW_PROGRESS_ENV_VAR).as_deref())
    }

    /// `progress_env` is the raw value of the progress environment variable
    fn options_with_progress_flag(&self, progress_env: Option<&OsStr>) -> StagerOptions {
        let show_progress = self.show_progress || progress_flag_enabled(progress_env);
        let policy = if self.continue_on_download_error {
            DownloadFailurePolicy::Continue
        } else {
            DownloadFailurePolicy::Abort
        };

        let mut options = match self.work_dir {
            Some(ref dir) => StagerOptions::new(dir),
            None => StagerOptions::default(),
        }
        .with_archive_name(&self.archive_name)
        .with_show_progress(show_progress)
        .with_download_failure_policy(policy)
        .with_overwrite(self.overwrite);

        if let Some(secs) = self.timeout {
            options = options.with_timeout(Duration::from_secs(secs));
        }
        options
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ReleaseConfig::from_env(&cli.config_env)
        .with_context(|| format!("failed to load configuration from {}", cli.config_env))?;

    let stager = Stager::new(cli.options()).context("failed to set up the stager")?;
    let report = stager
        .run(&config, None)
        .await
        .with_context(|| format!("failed to stage category '{}'", config.category))?;

    tracing::info!(
        "Staged {} paths ({} removed) from {} ({} bytes)",
        report.moved.len(),
        report.removed,
        report.update.url,
        report.bytes_downloaded
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is not an error
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => {
            println!("done.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            if let Some(stage_error) = e.downcast_ref::<stager::StageError>() {
                error!(category = stage_error.category(), "{:#}", e);
                if let Some(suggestion) = stage_error.suggestion() {
                    eprintln!("hint: {suggestion}");
                }
            } else {
                error!("{:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}
