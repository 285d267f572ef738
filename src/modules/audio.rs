//! WAV chunk decoding. The segmenter guarantees chunks are plain WAV, so
//! hound is all we need here.

use std::path::Path;

use hound::SampleFormat;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: hound::Error,
    },
    #[error("unsupported bit depth {0}")]
    UnsupportedBitDepth(u16),
}

/// Decoded chunk audio, samples normalized to [-1, 1] per channel.
#[derive(Debug, Clone)]
pub struct ChunkAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f64>>,
}

impl ChunkAudio {
    pub fn load(path: &Path) -> Result<Self, AudioError> {
        let read_err = |source: hound::Error| AudioError::Read {
            path: path.display().to_string(),
            source,
        };

        let mut reader = hound::WavReader::open(path).map_err(read_err)?;
        let spec = reader.spec();
        let channel_count = spec.channels as usize;

        let samples: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .samples::<f32>()
                .map(|s| s.map(|v| v as f64))
                .collect::<Result<_, _>>()
                .map_err(read_err)?,
            (SampleFormat::Int, bits @ 1..=32) => {
                let scale = (1i64 << (bits - 1)) as f64;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(read_err)?
            }
            (_, bits) => return Err(AudioError::UnsupportedBitDepth(bits)),
        };

        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for (i, sample) in samples.into_iter().enumerate() {
            channels[i % channel_count].push(sample);
        }

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels,
        })
    }

    pub fn is_stereo(&self) -> bool {
        self.channels.len() == 2
    }

    /// Left/right pair, or `None` when the chunk is not stereo.
    pub fn stereo(&self) -> Option<(&[f64], &[f64])> {
        if self.is_stereo() {
            Some((&self.channels[0], &self.channels[1]))
        } else {
            None
        }
    }

    /// Mono downmix (mean across channels).
    pub fn mono(&self) -> Vec<f64> {
        if self.channels.len() == 1 {
            return self.channels[0].clone();
        }
        let len = self.channels.iter().map(Vec::len).min().unwrap_or(0);
        let n = self.channels.len() as f64;
        (0..len)
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f64>() / n)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.wav");
        write_wav(&path, 1, &[0, 16384, -16384, 32767]);

        let audio = ChunkAudio::load(&path).unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert!(!audio.is_stereo());
        assert!(audio.stereo().is_none());
        assert_eq!(audio.channels[0].len(), 4);
        assert!((audio.channels[0][1] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_load_stereo_deinterleaves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.wav");
        // Interleaved L/R: L = 0.5-ish, R = -0.5-ish
        write_wav(&path, 2, &[16384, -16384, 16384, -16384]);

        let audio = ChunkAudio::load(&path).unwrap();
        let (left, right) = audio.stereo().unwrap();
        assert_eq!(left.len(), 2);
        assert!(left.iter().all(|&s| s > 0.0));
        assert!(right.iter().all(|&s| s < 0.0));

        let mono = audio.mono();
        assert!(mono.iter().all(|&s| s.abs() < 1e-9));
    }

    #[test]
    fn test_load_missing_file_errors() {
        assert!(matches!(
            ChunkAudio::load(Path::new("/nonexistent.wav")),
            Err(AudioError::Read { .. })
        ));
    }
}
