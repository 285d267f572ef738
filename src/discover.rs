//! Input resolver: enumerate source tracks from the configured directories.

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::SUPPORTED_EXTENSIONS;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("source directory does not exist: {0}")]
    MissingDir(PathBuf),
}

/// One input audio file. Identity is the file name (extension included),
/// which also names the track's output subdirectory.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub path: PathBuf,
    pub name: String,
}

impl Track {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        Some(Self {
            path: path.to_path_buf(),
            name,
        })
    }

    /// The track's output root: `<out>/<track name>`.
    pub fn output_root(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(&self.name)
    }
}

/// Walk the source directories and collect supported audio files,
/// sorted by name for a deterministic processing order.
pub fn discover_tracks(source_dirs: &[PathBuf]) -> Result<Vec<Track>, DiscoverError> {
    let mut tracks: Vec<Track> = Vec::new();

    for dir in source_dirs {
        if !dir.exists() {
            return Err(DiscoverError::MissingDir(dir.clone()));
        }
        for entry in WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_lowercase();
            if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            if let Some(track) = Track::from_path(entry.path()) {
                tracks.push(track);
            }
        }
    }

    tracks.sort_by(|a, b| a.name.cmp(&b.name));
    tracks.dedup_by(|a, b| a.name == b.name);
    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.wav"));
        touch(&dir.path().join("a.flac"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("c.MP3"));

        let tracks = discover_tracks(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<&str> = tracks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a.flac", "b.wav", "c.MP3"]);
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let err = discover_tracks(&[PathBuf::from("/nonexistent/waveprint-src")]);
        assert!(matches!(err, Err(DiscoverError::MissingDir(_))));
    }

    #[test]
    fn test_output_root() {
        let track = Track::from_path(Path::new("/music/song.wav")).unwrap();
        assert_eq!(
            track.output_root(Path::new("out")),
            PathBuf::from("out/song.wav")
        );
    }
}
