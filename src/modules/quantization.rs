//! Quantization analysis: effective bit depth from unique amplitude
//! levels, plus noise floor and spectral slope statistics from frame FFTs.

use super::audio::ChunkAudio;
use super::dsp::{self, FftAnalyzer};
use super::ModuleContext;
use crate::config::QuantizationParams;
use crate::cube::{GridBuilder, ModuleEntry};

const METRICS: [&str; 7] = [
    "estimated_bits",
    "unique_levels",
    "avg_noise_floor_db",
    "noise_floor_std_db",
    "avg_spectral_slope_db",
    "spectral_slope_std_db",
    "dynamic_range_db",
];

const SILENT_PEAK_DB: f64 = -120.0;
const EMPTY_SLOPE_DB: f64 = -60.0;

/// Estimated bit depth and the number of distinct positive amplitude
/// levels found. Levels closer together than `tolerance` merge.
pub fn estimate_bit_depth(signal: &[f64], tolerance: f64) -> (Option<f64>, usize) {
    let dc = dsp::mean(signal).unwrap_or(0.0);
    let mut magnitudes: Vec<f64> = signal
        .iter()
        .map(|s| (s - dc).abs())
        .filter(|&m| m != 0.0)
        .collect();
    if magnitudes.is_empty() {
        return (None, 0);
    }
    magnitudes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mut num_levels = 1usize;
    let mut current = magnitudes[0];
    for &m in &magnitudes[1..] {
        if (m - current).abs() > tolerance {
            num_levels += 1;
            current = m;
        }
    }

    if num_levels <= 1 {
        return (None, num_levels);
    }
    // Only positive levels were counted, so double before taking log2.
    let bits = ((num_levels * 2) as f64).log2();
    (Some(bits), num_levels)
}

/// Noise floor in dB from the lower percentile of a magnitude spectrum.
fn noise_floor_db(magnitudes: &[f64], percentile: f64) -> f64 {
    match dsp::percentile(magnitudes, percentile) {
        Some(p) if p > 0.0 => 20.0 * p.log10(),
        _ => SILENT_PEAK_DB,
    }
}

struct FrameArtifacts {
    noise_floor_db: f64,
    spectral_slope_db: f64,
}

/// Per-frame noise floor and mid-vs-high spectral slope over the full
/// two-sided spectrum. Quantization noise shows up as a flat slope.
fn frame_artifacts(
    signal: &[f64],
    analyzer: &FftAnalyzer,
    noise_percentile: f64,
) -> Vec<FrameArtifacts> {
    let frame_size = analyzer.size();
    let step = (frame_size / 2).max(1);
    let mut artifacts = Vec::new();

    let mut i = 0;
    while i + frame_size < signal.len() {
        let frame = &signal[i..i + frame_size];
        let dc = dsp::mean(frame).unwrap_or(0.0);
        let centered: Vec<f64> = frame.iter().map(|s| s - dc).collect();

        if dsp::std_dev(&centered).unwrap_or(0.0) == 0.0 {
            i += step;
            continue;
        }

        let mags = analyzer.full_magnitudes(&centered);
        let floor = noise_floor_db(&mags, noise_percentile);

        let mid_idx = mags.len() / 4;
        let high_idx = mags.len() / 2;
        let slope = if high_idx > mid_idx {
            let mid_energy = dsp::mean(&mags[mid_idx..high_idx]).unwrap_or(0.0);
            let high_energy = dsp::mean(&mags[high_idx..]).unwrap_or(0.0);
            if mid_energy > 0.0 && high_energy > 0.0 {
                20.0 * (high_energy / mid_energy).log10()
            } else {
                EMPTY_SLOPE_DB
            }
        } else {
            EMPTY_SLOPE_DB
        };

        artifacts.push(FrameArtifacts {
            noise_floor_db: floor,
            spectral_slope_db: slope,
        });
        i += step;
    }

    artifacts
}

struct QuantizationStats {
    estimated_bits: Option<f64>,
    unique_levels: usize,
    avg_noise_floor_db: Option<f64>,
    noise_floor_std_db: Option<f64>,
    avg_spectral_slope_db: Option<f64>,
    spectral_slope_std_db: Option<f64>,
    dynamic_range_db: Option<f64>,
}

fn analyze(signal: &[f64], analyzer: &FftAnalyzer, params: &QuantizationParams) -> QuantizationStats {
    let (estimated_bits, unique_levels) = estimate_bit_depth(signal, params.bit_depth_tolerance);
    let artifacts = frame_artifacts(signal, analyzer, params.noise_percentile);

    let floors: Vec<f64> = artifacts.iter().map(|a| a.noise_floor_db).collect();
    let slopes: Vec<f64> = artifacts.iter().map(|a| a.spectral_slope_db).collect();

    let avg_noise_floor = dsp::mean(&floors);
    let peak = signal.iter().fold(0.0f64, |a, s| a.max(s.abs()));
    let peak_db = if peak > 0.0 {
        20.0 * peak.log10()
    } else {
        SILENT_PEAK_DB
    };
    let dynamic_range = avg_noise_floor.map(|floor| peak_db - floor);

    QuantizationStats {
        estimated_bits,
        unique_levels,
        avg_noise_floor_db: avg_noise_floor,
        noise_floor_std_db: dsp::std_dev(&floors),
        avg_spectral_slope_db: dsp::mean(&slopes),
        spectral_slope_std_db: dsp::std_dev(&slopes),
        dynamic_range_db: dynamic_range,
    }
}

fn set_stats(grid: &mut GridBuilder, bi: usize, ci: usize, s: &QuantizationStats) {
    let r2 = |v: Option<f64>| v.map(|x| dsp::round_to(x, 2));
    grid.set("estimated_bits", bi, ci, r2(s.estimated_bits));
    grid.set("unique_levels", bi, ci, Some(s.unique_levels as f64));
    grid.set("avg_noise_floor_db", bi, ci, r2(s.avg_noise_floor_db));
    grid.set("noise_floor_std_db", bi, ci, r2(s.noise_floor_std_db));
    grid.set("avg_spectral_slope_db", bi, ci, r2(s.avg_spectral_slope_db));
    grid.set("spectral_slope_std_db", bi, ci, r2(s.spectral_slope_std_db));
    grid.set("dynamic_range_db", bi, ci, r2(s.dynamic_range_db));
}

pub fn banded(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.quantization;
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("quantization", &labels, ctx.chunks.len());
    for m in METRICS {
        grid.touch(m);
    }

    let analyzer = FftAnalyzer::new(params.frame_size);

    for (ci, chunk) in ctx.chunks.iter().enumerate() {
        let audio = match ChunkAudio::load(chunk) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("{}: {}", chunk.display(), e);
                continue;
            }
        };
        let signal = audio.mono();
        let rate = audio.sample_rate as f64;

        for (bi, band) in ctx.band_plan.ranges().iter().enumerate() {
            let band_signal = dsp::bandpass(&signal, rate, band.low_hz, band.high_hz);
            let stats = analyze(&band_signal, &analyzer, params);
            set_stats(&mut grid, bi, ci, &stats);
        }
    }

    grid.build()
}

pub fn full_spectrum(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.quantization_full_spectrum;
    let labels = ctx.full_spectrum_labels();
    let mut grid = GridBuilder::new("quantization_full_spectrum", &labels, ctx.chunks.len());
    for m in METRICS {
        grid.touch(m);
    }

    let analyzer = FftAnalyzer::new(params.frame_size);

    for (ci, chunk) in ctx.chunks.iter().enumerate() {
        let audio = match ChunkAudio::load(chunk) {
            Ok(a) => a,
            Err(e) => {
                log::warn!("{}: {}", chunk.display(), e);
                continue;
            }
        };
        let signal = audio.mono();
        let stats = analyze(&signal, &analyzer, params);
        set_stats(&mut grid, 0, ci, &stats);
    }

    grid.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_depth_of_coarse_quantization() {
        // 3-bit signal: 4 positive levels
        let signal: Vec<f64> = (0..1000)
            .map(|i| ((i % 8) as f64 - 3.5) / 4.0)
            .collect();
        let (bits, levels) = estimate_bit_depth(&signal, 1e-6);
        assert_eq!(levels, 4);
        assert!((bits.unwrap() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_bit_depth_of_silence() {
        let (bits, levels) = estimate_bit_depth(&vec![0.0; 100], 1e-6);
        assert_eq!(bits, None);
        assert_eq!(levels, 0);
    }

    #[test]
    fn test_bit_depth_single_level() {
        let signal = vec![0.5, -0.5, 0.5, -0.5, 0.5];
        let (bits, levels) = estimate_bit_depth(&signal, 1e-6);
        // DC removal shifts levels but they stay symmetric: still few levels
        assert!(levels <= 2);
        if levels <= 1 {
            assert_eq!(bits, None);
        }
    }

    #[test]
    fn test_noise_floor_of_flat_spectrum() {
        let mags = vec![0.1; 64];
        assert!((noise_floor_db(&mags, 10.0) - (-20.0)).abs() < 1e-9);
    }

    #[test]
    fn test_noise_floor_of_empty_spectrum() {
        assert_eq!(noise_floor_db(&[], 10.0), SILENT_PEAK_DB);
    }

    #[test]
    fn test_analyze_silence() {
        let analyzer = FftAnalyzer::new(1024);
        let params = QuantizationParams::default();
        let stats = analyze(&vec![0.0; 8192], &analyzer, &params);
        assert_eq!(stats.estimated_bits, None);
        assert_eq!(stats.unique_levels, 0);
        // Flat frames are skipped, so no artifact stats either
        assert_eq!(stats.avg_noise_floor_db, None);
        assert_eq!(stats.dynamic_range_db, None);
    }
}
