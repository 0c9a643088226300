//! Distribution of extracted release content
//!
//! The keep phase moves every path matched by a keep pattern out of the
//! extraction directory into the category directory, preserving its relative
//! location. The exclude phase then deletes whatever the exclude patterns
//! match inside the category directory. Work inside a phase runs
//! concurrently and the first failure fails the phase; the phases themselves
//! never overlap.

use futures::future::try_join_all;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{FileOperation, Result, StageError};
use crate::progress::{ProgressCallback, ProgressEvent};

/// One path moved during the keep phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedPath {
    pub pattern: String,
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Outcome of both distribution phases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DistributionReport {
    pub moved: Vec<MovedPath>,
    pub removed: usize,
}

/// Moves kept paths into a category directory and prunes excluded ones
pub struct Distributor {
    source_dir: PathBuf,
    category_dir: PathBuf,
    overwrite: bool,
    progress_callback: Option<ProgressCallback>,
}

impl Distributor {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(source_dir: P, category_dir: Q) -> Self {
        Self {
            source_dir: source_dir.into(),
            category_dir: category_dir.into(),
            overwrite: false,
            progress_callback: None,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_progress_callback(mut self, callback: Option<ProgressCallback>) -> Self {
        self.progress_callback = callback;
        self
    }

    /// Run the keep phase to completion, then the exclude phase
    pub async fn distribute(
        &self,
        keep_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<DistributionReport> {
        let moved = self.keep(keep_patterns).await?;
        let removed = self.exclude(exclude_patterns).await?;
        Ok(DistributionReport { moved, removed })
    }

    /// Move every path matched by `patterns` into the category directory
    pub async fn keep(&self, patterns: &[String]) -> Result<Vec<MovedPath>> {
        fs::create_dir_all(&self.category_dir).await
            .map_err(|e| StageError::FileSystem {
                path: self.category_dir.clone(),
                operation: FileOperation::CreateDir,
                source: e,
            })?;

        let batches = try_join_all(patterns.iter().map(|pattern| self.keep_pattern(pattern))).await?;
        let moved: Vec<MovedPath> = batches.into_iter().flatten().collect();

        info!("Kept {} paths in {}", moved.len(), self.category_dir.display());
        Ok(moved)
    }

    async fn keep_pattern(&self, pattern: &str) -> Result<Vec<MovedPath>> {
        let sources = if is_glob(pattern) {
            let matches = expand(&self.source_dir, pattern).await?;
            if matches.is_empty() {
                warn!("Keep pattern '{}' matched nothing in {}", pattern, self.source_dir.display());
                self.report(ProgressEvent::Warning {
                    message: format!("keep pattern '{pattern}' matched nothing"),
                });
            }
            outermost(matches)
        } else {
            // A literal path must exist; the move below reports it if it does not
            vec![self.source_dir.join(pattern)]
        };

        let moves = sources.into_iter().map(|from| {
            let relative = from.strip_prefix(&self.source_dir).unwrap_or(&from).to_path_buf();
            let to = self.category_dir.join(relative);
            async move {
                move_path(&from, &to, self.overwrite).await.map_err(|e| StageError::Move {
                    pattern: pattern.to_string(),
                    from: from.clone(),
                    to: to.clone(),
                    source: e,
                })?;
                debug!("Moved {} to {}", from.display(), to.display());
                Ok::<_, StageError>(MovedPath {
                    pattern: pattern.to_string(),
                    from,
                    to,
                })
            }
        });

        let moved = try_join_all(moves).await?;
        self.report(ProgressEvent::PatternKept {
            pattern: pattern.to_string(),
            matched: moved.len(),
        });
        Ok(moved)
    }

    /// Delete every path under the category directory matched by `patterns`
    pub async fn exclude(&self, patterns: &[String]) -> Result<usize> {
        let counts = try_join_all(patterns.iter().map(|pattern| self.exclude_pattern(pattern))).await?;
        let removed: usize = counts.into_iter().sum();

        info!("Excluded {} paths from {}", removed, self.category_dir.display());
        Ok(removed)
    }

    async fn exclude_pattern(&self, pattern: &str) -> Result<usize> {
        let targets = outermost(expand(&self.category_dir, pattern).await?);

        let removals = targets.into_iter().map(|path| async move {
            let removed = remove_path(&path).await.map_err(|e| StageError::Delete {
                pattern: pattern.to_string(),
                path: path.clone(),
                source: e,
            })?;
            if removed {
                debug!("Removed {}", path.display());
            }
            Ok::<_, StageError>(removed)
        });

        let removed = try_join_all(removals).await?.into_iter().filter(|&r| r).count();
        self.report(ProgressEvent::PatternExcluded {
            pattern: pattern.to_string(),
            removed,
        });
        Ok(removed)
    }

    fn report(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }
}

/// Wildcards never match a leading dot; `.env` needs `.*` or a literal name
const MATCH_OPTIONS: glob::MatchOptions = glob::MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Whether `pattern` contains glob metacharacters
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Drop matches nested inside another match; moving the parent carries them along
fn outermost(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    let mut kept: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        if !kept.iter().any(|parent| path.starts_with(parent)) {
            kept.push(path);
        }
    }
    kept
}

/// Expand `pattern` relative to `base`; the base itself is matched literally
pub async fn expand(base: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full_pattern = format!(
        "{}/{}",
        glob::Pattern::escape(&base.to_string_lossy()),
        pattern.trim_start_matches("./")
    );
    let pattern = pattern.to_string();

    tokio::task::spawn_blocking(move || {
        let paths = glob::glob_with(&full_pattern, MATCH_OPTIONS).map_err(|e| StageError::Pattern {
            pattern: pattern.clone(),
            source: e,
        })?;

        paths
            .map(|entry| {
                entry.map_err(|e| StageError::FileSystem {
                    path: e.path().to_path_buf(),
                    operation: FileOperation::Read,
                    source: io::Error::from(e),
                })
            })
            .collect::<Result<Vec<_>>>()
    })
    .await
    .map_err(|e| StageError::TaskFailed {
        task: "expand pattern",
        source: e,
    })?
}

/// Move a file or directory, copying across filesystems when rename cannot
pub async fn move_path(from: &Path, to: &Path, overwrite: bool) -> io::Result<()> {
    // Surface a missing source before touching the destination
    fs::symlink_metadata(from).await?;

    if fs::symlink_metadata(to).await.is_ok() {
        if !overwrite {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("destination '{}' already exists", to.display()),
            ));
        }
        remove_path(to).await?;
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("Rename crosses devices, copying {} instead", from.display());
            let (src, dst) = (from.to_path_buf(), to.to_path_buf());
            tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
                .await
                .map_err(io::Error::other)??;
            remove_path(from).await.map(|_| ())
        }
        Err(e) => Err(e),
    }
}

/// Recursively copy `from` to `to`, preserving file permissions
fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry.path().strip_prefix(from).map_err(io::Error::other)?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::os::unix::fs::symlink(std::fs::read_link(link)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::fs::copy(link, target).map(|_| ())
}

/// Remove a file or directory tree; `Ok(false)` when it was already gone
pub async fn remove_path(path: &Path) -> io::Result<bool> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };

    match result {
        Ok(()) => Ok(true),
        // An overlapping pattern removed it first
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
