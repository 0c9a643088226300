//! Archive extraction

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::error::{FileOperation, Result, StageError};

/// Counts of what an extraction wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
}

impl ExtractionSummary {
    pub fn entries(&self) -> usize {
        self.files + self.directories + self.symlinks
    }
}

/// Extract a zip archive into `dest_dir` on the blocking pool
pub async fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<ExtractionSummary> {
    let archive_path = archive_path.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();

    tokio::task::spawn_blocking(move || ArchiveExtractor::extract(&archive_path, &dest_dir))
        .await
        .map_err(|e| StageError::TaskFailed {
            task: "extract archive",
            source: e,
        })?
}

/// Zip extractor
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    /// Extract every entry of `archive_path` below `dest_dir`, creating it if absent
    pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<ExtractionSummary> {
        fs::create_dir_all(dest_dir).map_err(|e| StageError::FileSystem {
            path: dest_dir.to_path_buf(),
            operation: FileOperation::CreateDir,
            source: e,
        })?;

        let extraction_error = |source: zip::result::ZipError| StageError::Extraction {
            archive: archive_path.to_path_buf(),
            source,
        };

        let file = File::open(archive_path).map_err(|e| extraction_error(e.into()))?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(extraction_error)?;

        debug!("Extracting {} entries from {}", archive.len(), archive_path.display());

        let mut summary = ExtractionSummary::default();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(extraction_error)?;

            let relative: PathBuf = entry.enclosed_name().ok_or_else(|| StageError::UnsafeEntry {
                archive: archive_path.to_path_buf(),
                entry: entry.name().to_string(),
            })?;
            let outpath = dest_dir.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&outpath).map_err(|e| extraction_error(e.into()))?;
                summary.directories += 1;
                continue;
            }

            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).map_err(|e| extraction_error(e.into()))?;
            }

            if entry.is_symlink() {
                let mut target = String::new();
                entry.read_to_string(&mut target).map_err(|e| extraction_error(e.into()))?;
                if !link_stays_inside(&relative, Path::new(&target)) {
                    return Err(StageError::UnsafeEntry {
                        archive: archive_path.to_path_buf(),
                        entry: format!("{} -> {}", entry.name(), target),
                    });
                }
                create_symlink(&target, &outpath).map_err(|e| extraction_error(e.into()))?;
                debug!("Linked {} -> {}", outpath.display(), target);
                summary.symlinks += 1;
                continue;
            }

            let mut outfile = File::create(&outpath).map_err(|e| extraction_error(e.into()))?;
            io::copy(&mut entry, &mut outfile).map_err(|e| extraction_error(e.into()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))
                        .map_err(|e| extraction_error(e.into()))?;
                }
            }

            summary.files += 1;
        }

        info!(
            "Extracted {} files and {} directories into {}",
            summary.files,
            summary.directories,
            dest_dir.display()
        );
        Ok(summary)
    }
}

/// Whether a link at `entry` (relative to the extraction root) pointing at
/// `target` resolves inside that root
fn link_stays_inside(entry: &Path, target: &Path) -> bool {
    let mut depth = entry
        .parent()
        .map(|parent| parent.components().filter(|c| matches!(c, Component::Normal(_))).count())
        .unwrap_or(0);

    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Replace whatever is at `link` with a symlink to `target`
fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    match fs::symlink_metadata(link) {
        Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(link)?,
        Ok(_) => fs::remove_file(link)?,
        Err(_) => {}
    }

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }
    #[cfg(not(unix))]
    {
        // No portable symlink without privileges; keep the target as content
        fs::write(link, target)
    }
}
