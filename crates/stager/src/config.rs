//! Configuration types for the staging pipeline
//!
//! [`ReleaseConfig`] is the JSON document handed to the process through a
//! base64-encoded environment variable. [`StagerOptions`] carries the runtime
//! knobs that never travel in that document.

use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, StageError};

/// Default environment variable holding the encoded configuration
pub const CONFIG_ENV_VAR: &str = "ZIP_ENV";

/// Environment flag enabling the in-place progress display
pub const SHOW_PROGRESS_ENV_VAR: &str = "SHOW_PROGRESS";

/// Release description decoded from the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    /// Archive URL used as-is, skipping the update check
    #[serde(rename = "directURL", default, skip_serializing_if = "Option::is_none")]
    pub direct_url: Option<String>,
    /// Endpoint answering with a `{ success, value }` envelope
    #[serde(rename = "updateURL", default, skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_options: Option<FetchOptions>,
    pub keep_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub category: String,
}

/// Request options for the update check
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ReleaseConfig {
    /// Read and decode the configuration from the named environment variable
    pub fn from_env(variable: &str) -> Result<Self> {
        let encoded = std::env::var(variable).map_err(|_| StageError::MissingEnvironment {
            variable: variable.to_string(),
        })?;
        Self::decode(variable, &encoded)
    }

    /// Decode a base64 JSON envelope; `variable` only labels errors
    pub fn decode(variable: &str, encoded: &str) -> Result<Self> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| StageError::ConfigDecode {
                variable: variable.to_string(),
                source: e,
            })?;

        serde_json::from_slice(&raw).map_err(|e| StageError::ConfigParse {
            variable: variable.to_string(),
            source: e,
        })
    }

    /// Encode the configuration the way [`ReleaseConfig::decode`] expects it
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).map_err(|e| StageError::ConfigParse {
            variable: CONFIG_ENV_VAR.to_string(),
            source: e,
        })?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    /// The direct URL if one is set; an empty string counts as unset
    pub fn direct_url(&self) -> Option<&str> {
        self.direct_url.as_deref().filter(|url| !url.is_empty())
    }

    /// The update endpoint if one is set; an empty string counts as unset
    pub fn update_url(&self) -> Option<&str> {
        self.update_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Reject configurations that cannot be staged before doing any I/O
    pub fn validate(&self) -> Result<()> {
        match (self.direct_url(), self.update_url()) {
            (Some(url), _) | (None, Some(url)) => {
                url::Url::parse(url).map_err(|e| StageError::invalid_url(url, e))?;
            }
            (None, None) => {
                return Err(StageError::Configuration {
                    message: "neither directURL nor updateURL is set".to_string(),
                    field: Some("directURL".to_string()),
                    suggestion: Some("Provide a direct archive URL or an update endpoint".to_string()),
                });
            }
        }

        if self.category.trim().is_empty() {
            return Err(StageError::Configuration {
                message: "category must not be empty".to_string(),
                field: Some("category".to_string()),
                suggestion: None,
            });
        }
        ensure_relative("category", &self.category)?;

        for pattern in &self.keep_patterns {
            ensure_relative("keepPatterns", pattern)?;
        }
        for pattern in &self.exclude_patterns {
            ensure_relative("excludePatterns", pattern)?;
        }

        Ok(())
    }
}

/// Paths from the configuration must stay inside the directory they are joined to
fn ensure_relative(field: &str, value: &str) -> Result<()> {
    let escapes = value.is_empty()
        || Path::new(value)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

    if escapes {
        return Err(StageError::Configuration {
            message: format!("'{value}' is not a relative path inside the staging directories"),
            field: Some(field.to_string()),
            suggestion: Some("Use relative paths without '..' or a leading '/'".to_string()),
        });
    }
    Ok(())
}

/// What to do when streaming the archive fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DownloadFailurePolicy {
    /// Propagate the error and stop the pipeline
    #[default]
    Abort,
    /// Log the error and extract whatever reached the disk
    Continue,
}

/// Runtime options for a staging run
#[derive(Debug, Clone)]
pub struct StagerOptions {
    /// Directory the archive, `temp` and `dist` live in
    pub work_dir: PathBuf,
    pub archive_name: String,
    pub temp_dir_name: String,
    pub dist_dir_name: String,
    /// How often download throughput is sampled
    pub sample_interval: Duration,
    pub user_agent: String,
    /// No timeout unless one is set explicitly
    pub timeout: Option<Duration>,
    pub show_progress: bool,
    pub download_failure_policy: DownloadFailurePolicy,
    /// Replace destinations that already exist when keeping paths
    pub overwrite: bool,
}

impl StagerOptions {
    /// Options rooted at `work_dir` with every other knob at its default
    pub fn new<P: Into<PathBuf>>(work_dir: P) -> Self {
        Self {
            work_dir: work_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_archive_name<S: Into<String>>(mut self, archive_name: S) -> Self {
        self.archive_name = archive_name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_download_failure_policy(mut self, policy: DownloadFailurePolicy) -> Self {
        self.download_failure_policy = policy;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.work_dir.join(&self.archive_name)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.work_dir.join(&self.temp_dir_name)
    }

    pub fn category_dir(&self, category: &str) -> PathBuf {
        self.work_dir.join(&self.dist_dir_name).join(category)
    }
}

impl Default for StagerOptions {
    fn default() -> Self {
        Self {
            work_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            archive_name: "file.zip".to_string(),
            temp_dir_name: "temp".to_string(),
            dist_dir_name: "dist".to_string(),
            sample_interval: Duration::from_secs(5),
            user_agent: concat!("stager/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: None,
            show_progress: false,
            download_failure_policy: DownloadFailurePolicy::Abort,
            overwrite: false,
        }
    }
}

/// Any non-empty value of the progress flag enables the display
pub fn progress_flag_enabled(value: Option<&OsStr>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}
