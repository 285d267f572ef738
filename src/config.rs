use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Application configuration loaded from a TOML config file.
/// All fields have sensible defaults, so the config file is optional.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// Directories to scan for source tracks (used when `analyze` has no CLI args).
    pub source_dirs: Vec<PathBuf>,
    /// Root of the output tree (one subdirectory per track).
    pub output_dir: Option<PathBuf>,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
    /// Module names that re-run even when their results are cached.
    pub always_run: Vec<String>,
    /// Segmenter settings.
    pub segmenter: SegmenterConfig,
    /// Shared frequency band plan for band-aware modules.
    pub multiband: MultibandConfig,
    /// Per-module analysis parameters.
    pub modules: ModuleParams,
    /// Fingerprint rendering settings.
    pub fingerprint: FingerprintConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Path to the sox binary.
    pub sox_path: PathBuf,
    /// Chunk length as a timespan: "SS", "MM:SS" or "HH:MM:SS".
    pub chunk_duration: String,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            sox_path: PathBuf::from("sox"),
            chunk_duration: "0:30".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MultibandConfig {
    pub cutoff_low_hz: f64,
    pub cutoff_high_hz: f64,
    pub bands: usize,
}

impl Default for MultibandConfig {
    fn default() -> Self {
        Self {
            cutoff_low_hz: 20.0,
            cutoff_high_hz: 21000.0,
            bands: 10,
        }
    }
}

/// Analysis parameters, one block per module that takes any.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ModuleParams {
    pub sparkle: SparkleParams,
    pub stereo_phase: StereoPhaseParams,
    pub harmonics: HarmonicsParams,
    pub harmonics_full_spectrum: HarmonicsFullSpectrumParams,
    pub freq_response: FreqResponseParams,
    pub dynamics: DynamicsParams,
    pub dynamics_full_spectrum: DynamicsParams,
    pub quantization: QuantizationParams,
    pub quantization_full_spectrum: QuantizationParams,
    pub sinad: SinadParams,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SparkleParams {
    pub frame_ms: u32,
    /// Bands entirely below this frequency report zero sparkle.
    pub min_frequency_hz: f64,
}

impl Default for SparkleParams {
    fn default() -> Self {
        Self {
            frame_ms: 20,
            min_frequency_hz: 1300.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StereoPhaseParams {
    pub fft_size: usize,
    pub overlap: f64,
}

impl Default for StereoPhaseParams {
    fn default() -> Self {
        Self {
            fft_size: 128,
            overlap: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HarmonicsParams {
    pub fft_size: usize,
    pub hop_size: usize,
}

impl Default for HarmonicsParams {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            hop_size: 2048,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HarmonicsFullSpectrumParams {
    pub fft_size: usize,
    pub hop_size: usize,
    /// Flatness is measured only up to this frequency.
    pub band_limit_hz: f64,
}

impl Default for HarmonicsFullSpectrumParams {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            hop_size: 2048,
            band_limit_hz: 16000.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FreqResponseParams {
    pub fft_size: usize,
    pub overlap: f64,
}

impl Default for FreqResponseParams {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            overlap: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DynamicsParams {
    pub frame_ms: u32,
}

impl Default for DynamicsParams {
    fn default() -> Self {
        Self { frame_ms: 100 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QuantizationParams {
    pub frame_size: usize,
    pub bit_depth_tolerance: f64,
    pub noise_percentile: f64,
}

impl Default for QuantizationParams {
    fn default() -> Self {
        Self {
            frame_size: 1024,
            bit_depth_tolerance: 1e-6,
            noise_percentile: 10.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SinadParams {
    pub fft_size: usize,
    pub overlap: f64,
    pub noise_percentile: f64,
}

impl Default for SinadParams {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            overlap: 0.5,
            noise_percentile: 10.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Axis permutations to render; three-letter codes over {b, t, m}.
    pub permutations: Vec<String>,
    /// Square datapoint size in pixels.
    pub datapoint_px: u32,
    /// Page padding around the grid, in pixels.
    pub padding_px: u32,
    /// Spacing between grid cells, in pixels.
    pub spacing_px: u32,
    /// Thickness of the per-metric min/max indicator strips, in pixels.
    pub indicator_px: u32,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            permutations: vec![
                "btm".to_string(),
                "bmt".to_string(),
                "tbm".to_string(),
                "tmb".to_string(),
                "mbt".to_string(),
                "mtb".to_string(),
            ],
            datapoint_px: 16,
            padding_px: 12,
            spacing_px: 1,
            indicator_px: 4,
        }
    }
}

impl AppConfig {
    /// Load config from the given path, or `./waveprint.toml` if not given.
    /// Returns defaults when the file doesn't exist; logs a warning when it
    /// exists but can't be parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("waveprint.toml"));

        if !config_path.exists() {
            log::debug!("No config file at {}, using defaults", config_path.display());
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    log::warn!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Output root: config value or `./out`.
    pub fn resolve_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("out"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.multiband.bands, 10);
        assert_eq!(config.segmenter.chunk_duration, "0:30");
        assert_eq!(config.fingerprint.permutations.len(), 6);
        assert!(config.always_run.is_empty());
        assert_eq!(config.resolve_output_dir(), PathBuf::from("out"));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
            workers = 4
            always_run = ["dynamics"]

            [multiband]
            bands = 5

            [modules.sparkle]
            min_frequency_hz = 2000.0
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.workers, 4);
        assert_eq!(config.always_run, vec!["dynamics".to_string()]);
        assert_eq!(config.multiband.bands, 5);
        // Untouched sections keep defaults
        assert!((config.modules.sparkle.min_frequency_hz - 2000.0).abs() < f64::EPSILON);
        assert_eq!(config.modules.sparkle.frame_ms, 20);
        assert_eq!(config.modules.harmonics.fft_size, 4096);
    }

    #[test]
    fn test_resolve_workers_auto() {
        let config = AppConfig::default();
        assert!(config.resolve_workers() >= 1);
        let mut fixed = AppConfig::default();
        fixed.workers = 3;
        assert_eq!(fixed.resolve_workers(), 3);
    }
}
