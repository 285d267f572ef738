//! Stereo field modules: mid/side width, channel correlation, and phase
//! coherence. All three require stereo chunks; mono chunks leave their
//! cells empty.

use super::audio::ChunkAudio;
use super::dsp::{self, FftAnalyzer};
use super::ModuleContext;
use crate::cube::{GridBuilder, ModuleEntry};

const WIDTH_METRICS: [&str; 5] = ["mid_rms", "side_rms", "width_ratio", "presence", "quality"];

/// Mid/side balance per band, plus the derived presence and quality scores.
pub fn width(ctx: &ModuleContext) -> ModuleEntry {
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("stereo_width", &labels, ctx.chunks.len());
    for metric in WIDTH_METRICS {
        grid.touch(metric);
    }

    for (ci, chunk) in ctx.chunks.iter().enumerate() {
        let Some(audio) = load_stereo(chunk) else {
            continue;
        };
        let (left, right) = (&audio.channels[0], &audio.channels[1]);
        let rate = audio.sample_rate as f64;

        for (bi, band) in ctx.band_plan.ranges().iter().enumerate() {
            let left_band = dsp::bandpass(left, rate, band.low_hz, band.high_hz);
            let right_band = dsp::bandpass(right, rate, band.low_hz, band.high_hz);

            let mid: Vec<f64> = left_band
                .iter()
                .zip(&right_band)
                .map(|(l, r)| 0.5 * (l + r))
                .collect();
            let side: Vec<f64> = left_band
                .iter()
                .zip(&right_band)
                .map(|(l, r)| 0.5 * (l - r))
                .collect();

            let mid_rms = dsp::rms_dbfs(&mid);
            let side_rms = dsp::rms_dbfs(&side);

            // A silent mid means no content to be wide relative to.
            let width_ratio = match mid_rms {
                Some(mid_db) => {
                    let side_lin = side_rms.map_or(0.0, |db| 10f64.powf(db / 20.0));
                    side_lin / 10f64.powf(mid_db / 20.0)
                }
                None => 0.0,
            };

            let presence = 1.0 - (-width_ratio).exp();
            let quality = width_quality(width_ratio);

            grid.set("mid_rms", bi, ci, mid_rms.map(|v| dsp::round_to(v, 2)));
            grid.set("side_rms", bi, ci, side_rms.map(|v| dsp::round_to(v, 2)));
            grid.set("width_ratio", bi, ci, Some(dsp::round_to(width_ratio, 4)));
            grid.set("presence", bi, ci, Some(dsp::round_to(presence, 4)));
            grid.set("quality", bi, ci, Some(dsp::round_to(quality, 4)));
        }
    }

    grid.build()
}

/// Piecewise width health score in [-1, 1]. Below 0.85 is healthy; ratios
/// past 1.3 (side louder than mid by a wide margin) score -1.
fn width_quality(width_ratio: f64) -> f64 {
    if width_ratio < 0.85 {
        1.0
    } else if width_ratio <= 1.0 {
        1.0 - (width_ratio - 0.85) / 0.15
    } else if width_ratio <= 1.3 {
        -0.7 * (width_ratio - 1.0) / 0.3
    } else {
        -1.0
    }
}

/// Pearson correlation between the band-filtered channels.
pub fn correlation(ctx: &ModuleContext) -> ModuleEntry {
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("stereo_correlation", &labels, ctx.chunks.len());
    grid.touch("correlation");

    for (ci, chunk) in ctx.chunks.iter().enumerate() {
        let Some(audio) = load_stereo(chunk) else {
            continue;
        };
        let (left, right) = (&audio.channels[0], &audio.channels[1]);
        let rate = audio.sample_rate as f64;

        for (bi, band) in ctx.band_plan.ranges().iter().enumerate() {
            let left_band = dsp::bandpass(left, rate, band.low_hz, band.high_hz);
            let right_band = dsp::bandpass(right, rate, band.low_hz, band.high_hz);
            let corr = pearson(&left_band, &right_band);
            grid.set("correlation", bi, ci, corr.map(|v| dsp::round_to(v, 4)));
        }
    }

    grid.build()
}

fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    let std_a = dsp::std_dev(a)?;
    let std_b = dsp::std_dev(b)?;

    // A flat channel correlates fully only with an identical flat channel.
    if std_a == 0.0 || std_b == 0.0 {
        let close = a
            .iter()
            .zip(b)
            .all(|(x, y)| (x - y).abs() <= 1e-8 * y.abs().max(1.0));
        return Some(if close { 1.0 } else { 0.0 });
    }

    let mean_a = dsp::mean(a)?;
    let mean_b = dsp::mean(b)?;
    let cov = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / a.len() as f64;
    let r = cov / (std_a * std_b);
    if r.is_nan() {
        None
    } else {
        Some(r)
    }
}

/// FFT-based phase coherence: mean |cos(phase difference)| over energetic
/// bins. 1.0 is perfect phase lock, 0.0 random phase.
pub fn phase(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.stereo_phase;
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("stereo_phase", &labels, ctx.chunks.len());
    grid.touch("coherence");

    let analyzer = FftAnalyzer::new(params.fft_size);

    for (ci, chunk) in ctx.chunks.iter().enumerate() {
        let Some(audio) = load_stereo(chunk) else {
            continue;
        };
        let (left, right) = (&audio.channels[0], &audio.channels[1]);
        let rate = audio.sample_rate as f64;

        for (bi, band) in ctx.band_plan.ranges().iter().enumerate() {
            let left_band = dsp::bandpass(left, rate, band.low_hz, band.high_hz);
            let right_band = dsp::bandpass(right, rate, band.low_hz, band.high_hz);
            let coherence = phase_coherence(&left_band, &right_band, &analyzer, params.overlap);
            grid.set("coherence", bi, ci, coherence.map(|v| dsp::round_to(v, 4)));
        }
    }

    grid.build()
}

fn phase_coherence(
    left: &[f64],
    right: &[f64],
    analyzer: &FftAnalyzer,
    overlap: f64,
) -> Option<f64> {
    let fft_size = analyzer.size();
    if left.len() < fft_size {
        // Too short for phase analysis; report neutral coherence.
        return Some(0.5);
    }

    let step = ((fft_size as f64) * (1.0 - overlap)) as usize;
    let step = step.max(1);
    let mut frame_values = Vec::new();

    let mut i = 0;
    while i + fft_size < left.len() {
        let left_fft = analyzer.spectrum(&left[i..i + fft_size]);
        let right_fft = analyzer.spectrum(&right[i..i + fft_size]);

        let max_mag = left_fft
            .iter()
            .zip(&right_fft)
            .map(|(l, r)| l.norm().max(r.norm()))
            .fold(0.0f64, f64::max);
        let threshold = 0.01 * max_mag;

        let mut sum = 0.0;
        let mut count = 0usize;
        for (l, r) in left_fft.iter().zip(&right_fft) {
            if l.norm() > threshold && r.norm() > threshold {
                let diff = l.arg() - r.arg();
                sum += diff.cos().abs();
                count += 1;
            }
        }
        if count > 0 {
            frame_values.push(sum / count as f64);
        }

        i += step;
    }

    dsp::mean(&frame_values)
}

fn load_stereo(chunk: &std::path::Path) -> Option<ChunkAudio> {
    match ChunkAudio::load(chunk) {
        Ok(audio) if audio.is_stereo() => Some(audio),
        Ok(_) => {
            log::debug!("{}: not stereo, skipping", chunk.display());
            None
        }
        Err(e) => {
            log::warn!("{}: {}", chunk.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, rate: f64, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / rate).sin())
            .collect()
    }

    #[test]
    fn test_width_quality_regions() {
        assert_eq!(width_quality(0.2), 1.0);
        assert!((width_quality(0.925) - 0.5).abs() < 1e-9);
        assert!((width_quality(1.0) - 0.0).abs() < 1e-9);
        assert!((width_quality(1.15) - (-0.35)).abs() < 1e-9);
        assert_eq!(width_quality(2.0), -1.0);
    }

    #[test]
    fn test_pearson_identical_signals() {
        let s = sine(440.0, 44100.0, 4096);
        assert!((pearson(&s, &s).unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_inverted_signals() {
        let s = sine(440.0, 44100.0, 4096);
        let inv: Vec<f64> = s.iter().map(|v| -v).collect();
        assert!((pearson(&s, &inv).unwrap() - (-1.0)).abs() < 1e-9);
    }

    #[test]
    fn test_pearson_flat_channels() {
        let flat = vec![0.25; 128];
        assert_eq!(pearson(&flat, &flat), Some(1.0));
        let other = vec![0.5; 128];
        assert_eq!(pearson(&flat, &other), Some(0.0));
    }

    #[test]
    fn test_phase_coherence_identical_is_locked() {
        let s = sine(1000.0, 44100.0, 8192);
        let analyzer = FftAnalyzer::new(128);
        let c = phase_coherence(&s, &s, &analyzer, 0.5).unwrap();
        assert!(c > 0.99, "got {c}");
    }

    #[test]
    fn test_phase_coherence_short_signal_is_neutral() {
        let s = sine(1000.0, 44100.0, 64);
        let analyzer = FftAnalyzer::new(128);
        assert_eq!(phase_coherence(&s, &s, &analyzer, 0.5), Some(0.5));
    }
}
