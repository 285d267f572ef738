//! Segmenter adapter: split a track into fixed-length WAV chunks via sox.
//!
//! The core only consumes the ordered chunk list; sox is an opaque
//! collaborator invoked once per track. Chunks land in
//! `<out>/<track>/media/` next to a copy of the original, named
//! `<track>.NNN.wav` so the 0-based index is recoverable from the name.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::discover::Track;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("invalid chunk duration {0:?}")]
    InvalidDuration(String),
    #[error("sox not found at {0}")]
    SoxNotFound(PathBuf),
    #[error("sox failed: {0}")]
    Sox(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of segmenting one track.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Ordered chunk files; index in this list is the chunk's time index.
    pub chunks: Vec<PathBuf>,
    pub chunk_duration_secs: f64,
}

/// Parse "SS", "MM:SS" or "HH:MM:SS" into seconds.
pub fn parse_timespan(timespan: &str) -> Result<f64, SegmentError> {
    let parts: Vec<&str> = timespan.trim().split(':').collect();
    let parse =
        |s: &str| -> Result<u64, SegmentError> {
            s.parse::<u64>()
                .map_err(|_| SegmentError::InvalidDuration(timespan.to_string()))
        };
    let seconds = match parts.as_slice() {
        [s] => parse(s)?,
        [m, s] => parse(m)? * 60 + parse(s)?,
        [h, m, s] => parse(h)? * 3600 + parse(m)? * 60 + parse(s)?,
        _ => return Err(SegmentError::InvalidDuration(timespan.to_string())),
    };
    if seconds == 0 {
        return Err(SegmentError::InvalidDuration(timespan.to_string()));
    }
    Ok(seconds as f64)
}

/// Chunk file name for a given track and 0-based index.
pub fn chunk_file_name(track_name: &str, index: usize) -> String {
    format!("{track_name}.{index:03}.wav")
}

/// Segment a track into fixed-duration chunks, copying the original into
/// the media directory first. Existing chunk files are reused so a
/// re-run against a cached track does not invoke sox again.
pub fn segment_track(
    track: &Track,
    track_output_root: &Path,
    sox_path: &Path,
    chunk_duration: &str,
) -> Result<Segmentation, SegmentError> {
    let chunk_duration_secs = parse_timespan(chunk_duration)?;

    let media_dir = track_output_root.join("media");
    std::fs::create_dir_all(&media_dir)?;

    // Copy the source next to the chunks if not already present.
    let copied = media_dir.join(&track.name);
    if !copied.exists() {
        std::fs::copy(&track.path, &copied)?;
    }

    // Reuse chunks from a previous run when any exist.
    let existing = collect_chunks(&media_dir, &track.name)?;
    if !existing.is_empty() {
        log::debug!(
            "Reusing {} existing chunks for {}",
            existing.len(),
            track.name
        );
        return Ok(Segmentation {
            chunks: existing,
            chunk_duration_secs,
        });
    }

    run_sox(&copied, &media_dir, &track.name, sox_path, chunk_duration_secs)?;

    let chunks = collect_chunks(&media_dir, &track.name)?;
    Ok(Segmentation {
        chunks,
        chunk_duration_secs,
    })
}

/// Invoke sox: `sox <src> <prefix>.wav trim 0 <len> : newfile : restart`.
/// sox numbers its output files 001.. which we rename to the 0-based
/// `.NNN.wav` scheme.
fn run_sox(
    source: &Path,
    media_dir: &Path,
    track_name: &str,
    sox_path: &Path,
    chunk_secs: f64,
) -> Result<(), SegmentError> {
    let out_prefix = media_dir.join(format!("{track_name}.wav"));

    let output = Command::new(sox_path)
        .arg(source)
        .arg(&out_prefix)
        .args(["trim", "0"])
        .arg(format!("{chunk_secs}"))
        .args([":", "newfile", ":", "restart"])
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SegmentError::SoxNotFound(sox_path.to_path_buf())
            } else {
                SegmentError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SegmentError::Sox(stderr.trim().to_string()));
    }

    // sox emits `<track>001.wav`, `<track>002.wav`, ...; rename to
    // `<track>.000.wav` etc. so the index is 0-based and dot-separated.
    for (i, path) in produced_chunks(media_dir, track_name)?.iter().enumerate() {
        let new_path = media_dir.join(chunk_file_name(track_name, i));
        std::fs::rename(path, &new_path)?;
    }

    Ok(())
}

/// Raw sox output files (`<track>NNN.wav`) in chunk order. Sorts by the
/// parsed number: past chunk 999 sox widens the field to 4 digits and
/// lexicographic order would put 1000 before 999.
fn produced_chunks(media_dir: &Path, track_name: &str) -> Result<Vec<PathBuf>, SegmentError> {
    let mut produced: Vec<(u32, PathBuf)> = std::fs::read_dir(media_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|p| {
            let name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
            sox_chunk_number(name, track_name).map(|n| (n, p.clone()))
        })
        .collect();
    produced.sort_by_key(|(n, _)| *n);
    Ok(produced.into_iter().map(|(_, p)| p).collect())
}

/// Extract the sox-assigned number from `<track>NNN.wav`. sox pads to
/// 3 digits and widens the field once the count passes 999.
fn sox_chunk_number(file_name: &str, track_name: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(track_name)?;
    let digits = rest.strip_suffix(".wav")?;
    if digits.len() >= 3 && digits.chars().all(|c| c.is_ascii_digit()) {
        digits.parse().ok()
    } else {
        None
    }
}

/// Collect already-renamed chunk files (`<track>.NNN.wav`) in index order.
fn collect_chunks(media_dir: &Path, track_name: &str) -> Result<Vec<PathBuf>, SegmentError> {
    let mut chunks = Vec::new();
    loop {
        let candidate = media_dir.join(chunk_file_name(track_name, chunks.len()));
        if candidate.exists() {
            chunks.push(candidate);
        } else {
            break;
        }
    }
    Ok(chunks)
}

/// Parse the chunk index back out of a chunk file name.
pub fn chunk_index(file_name: &str) -> Option<usize> {
    // `<track>.NNN.wav`, second-to-last dot-separated component
    let parts: Vec<&str> = file_name.rsplit('.').collect();
    if parts.len() < 3 || parts[0] != "wav" {
        return None;
    }
    parts[1].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timespan_forms() {
        assert_eq!(parse_timespan("30").unwrap(), 30.0);
        assert_eq!(parse_timespan("0:30").unwrap(), 30.0);
        assert_eq!(parse_timespan("2:05").unwrap(), 125.0);
        assert_eq!(parse_timespan("1:00:01").unwrap(), 3601.0);
        assert_eq!(parse_timespan(" 45 ").unwrap(), 45.0);
    }

    #[test]
    fn test_parse_timespan_rejects_garbage() {
        assert!(parse_timespan("").is_err());
        assert!(parse_timespan("abc").is_err());
        assert!(parse_timespan("1:2:3:4").is_err());
        assert!(parse_timespan("0").is_err());
        assert!(parse_timespan("0:00").is_err());
    }

    #[test]
    fn test_chunk_file_name_round_trip() {
        let name = chunk_file_name("song.flac", 7);
        assert_eq!(name, "song.flac.007.wav");
        assert_eq!(chunk_index(&name), Some(7));
        assert_eq!(chunk_index("song.flac.123.wav"), Some(123));
        assert_eq!(chunk_index("song.wav"), None);
    }

    #[test]
    fn test_sox_chunk_number() {
        assert_eq!(sox_chunk_number("song.wav001.wav", "song.wav"), Some(1));
        assert_eq!(sox_chunk_number("song.wav.000.wav", "song.wav"), None);
        assert_eq!(sox_chunk_number("other001.wav", "song.wav"), None);
        assert_eq!(sox_chunk_number("song.wav01.wav", "song.wav"), None);
    }

    #[test]
    fn test_sox_chunk_number_accepts_wide_fields() {
        assert_eq!(sox_chunk_number("song.wav999.wav", "song.wav"), Some(999));
        assert_eq!(sox_chunk_number("song.wav1000.wav", "song.wav"), Some(1000));
        assert_eq!(sox_chunk_number("song.wav1001.wav", "song.wav"), Some(1001));
    }

    #[test]
    fn test_produced_chunks_order_survives_wide_fields() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["song.wav1000.wav", "song.wav999.wav", "song.wav001.wav"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let chunks = produced_chunks(dir.path(), "song.wav").unwrap();
        let names: Vec<String> = chunks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["song.wav001.wav", "song.wav999.wav", "song.wav1000.wav"]
        );
    }

    #[test]
    fn test_collect_chunks_stops_at_gap() {
        let dir = tempfile::tempdir().unwrap();
        for i in [0usize, 1, 3] {
            std::fs::write(dir.path().join(chunk_file_name("t.wav", i)), b"x").unwrap();
        }
        let chunks = collect_chunks(dir.path(), "t.wav").unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_reuses_existing_chunks_without_sox() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("t.wav");
        std::fs::write(&src, b"not-really-audio").unwrap();
        let out_root = dir.path().join("out").join("t.wav");
        let media = out_root.join("media");
        std::fs::create_dir_all(&media).unwrap();
        for i in 0..2 {
            std::fs::write(media.join(chunk_file_name("t.wav", i)), b"x").unwrap();
        }

        let track = Track::from_path(&src).unwrap();
        // sox path is bogus on purpose: reuse must short-circuit before it runs
        let seg = segment_track(&track, &out_root, Path::new("/nonexistent/sox"), "0:30").unwrap();
        assert_eq!(seg.chunks.len(), 2);
        assert_eq!(seg.chunk_duration_secs, 30.0);
    }
}
