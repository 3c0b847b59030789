use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::LibrarySection;
use crate::normalize::FilenameNormalizer;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("media directory {0:?} not found")]
    Missing(PathBuf),
    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

pub type LibraryResult<T> = Result<T, LibraryError>;

/// A media file and the title used to match it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaFileRecord {
    pub absolute_path: PathBuf,
    pub normalized_title: String,
}

impl MediaFileRecord {
    pub fn new(path: impl Into<PathBuf>, normalizer: &FilenameNormalizer) -> Self {
        let absolute_path = path.into();
        let file_name = absolute_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let normalized_title = normalizer.normalize(&file_name);
        Self {
            absolute_path,
            normalized_title,
        }
    }
}

/// Walks `root` and returns every media file that passes the extension and
/// prefix filters, sorted by path.
pub fn scan_library(
    root: &Path,
    section: &LibrarySection,
    normalizer: &FilenameNormalizer,
) -> LibraryResult<Vec<MediaFileRecord>> {
    if !root.exists() {
        return Err(LibraryError::Missing(root.to_path_buf()));
    }
    info!(root = %root.display(), "scanning media library");

    let mut records = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| LibraryError::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !is_media_file(&name, section) {
            debug!(path = %entry.path().display(), "skipping non-media file");
            continue;
        }
        let path = entry.path();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        records.push(MediaFileRecord::new(absolute, normalizer));
    }
    records.sort_by(|a, b| a.absolute_path.cmp(&b.absolute_path));

    info!(count = records.len(), "media library scanned");
    Ok(records)
}

fn is_media_file(name: &str, section: &LibrarySection) -> bool {
    if !section.skip_prefix.is_empty() && name.starts_with(&section.skip_prefix) {
        return false;
    }
    section
        .extensions
        .iter()
        .any(|extension| name.ends_with(extension.as_str()))
}
