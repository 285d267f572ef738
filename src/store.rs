//! Persistence for per-track metrics documents.
//!
//! One JSON file per track at `<out>/<track>/<track>.json`. A document
//! that exists but fails to parse is a hard error for that track; the
//! caller must pass `discard_corrupt` to overwrite it.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cube::MetricsDocument;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt metrics document at {path}: {source} (re-run with --discard-corrupt to rebuild)")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Path to a track's metrics document inside its output root. The file
/// is named after the track (the output root's directory name).
pub fn metrics_path(track_output_root: &Path) -> PathBuf {
    let name = track_output_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "metrics".to_string());
    track_output_root.join(format!("{name}.json"))
}

/// Load the track's document if one exists.
///
/// Returns `Ok(None)` when the file is absent. A present-but-unparseable
/// file is `StoreError::Corrupt` unless `discard_corrupt` is set, in which
/// case it is treated as absent and will be overwritten on save.
pub fn load(
    track_output_root: &Path,
    discard_corrupt: bool,
) -> Result<Option<MetricsDocument>, StoreError> {
    let path = metrics_path(track_output_root);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
        path: path.clone(),
        source,
    })?;

    match serde_json::from_str(&contents) {
        Ok(doc) => Ok(Some(doc)),
        Err(source) if discard_corrupt => {
            log::warn!("Discarding corrupt document at {}: {}", path.display(), source);
            Ok(None)
        }
        Err(source) => Err(StoreError::Corrupt { path, source }),
    }
}

/// Write the document atomically: serialize to a sibling temp file, then
/// rename over the target.
pub fn save(track_output_root: &Path, doc: &MetricsDocument) -> Result<(), StoreError> {
    let path = metrics_path(track_output_root);
    let tmp = path.with_extension("json.tmp");

    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.clone(),
        source,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Corrupt {
        path: path.clone(),
        source,
    })?;
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, &path).map_err(io_err)?;
    Ok(())
}
