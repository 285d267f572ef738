//! Spectral shape modules. The banded variant reports where energy sits
//! inside each band (centroid and rolloff as 0-1 fractions of the band);
//! the full-spectrum variant reports spectral flatness of the raw signal.

use super::audio::ChunkAudio;
use super::dsp::{self, FftAnalyzer};
use super::ModuleContext;
use crate::cube::{GridBuilder, ModuleEntry};

const ROLLOFF_PERCENT: f64 = 0.85;

pub fn banded(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.harmonics;
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("harmonics", &labels, ctx.chunks.len());
    grid.touch("spectral_centroid_fraction");
    grid.touch("spectral_rolloff_fraction");

    let analyzer = FftAnalyzer::new(params.fft_size);

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
            let (centroid, rolloff) = band_spectral_fractions(
                &band_signal,
                &analyzer,
                params.hop_size,
                rate,
                band.low_hz,
                band.high_hz,
            );
            grid.set(
                "spectral_centroid_fraction",
                bi,
                ci,
                centroid.map(|v| dsp::round_to(v, 4)),
            );
            grid.set(
                "spectral_rolloff_fraction",
                bi,
                ci,
                rolloff.map(|v| dsp::round_to(v, 4)),
            );
        }
    }

    grid.build()
}

/// Per-frame centroid and rolloff positions inside [f_low, f_high], both
/// averaged over frames and normalized to a 0-1 fraction of the band.
fn band_spectral_fractions(
    signal: &[f64],
    analyzer: &FftAnalyzer,
    hop_size: usize,
    rate: f64,
    f_low: f64,
    f_high: f64,
) -> (Option<f64>, Option<f64>) {
    let fft_size = analyzer.size();
    let hop = hop_size.max(1);
    let band_width = f_high - f_low;

    let mut centroids = Vec::new();
    let mut rolloffs = Vec::new();

    let mut i = 0;
    while i + fft_size < signal.len() {
        let mags = analyzer.magnitudes(&signal[i..i + fft_size]);

        // Bins inside the band, as (frequency, magnitude)
        let band_bins: Vec<(f64, f64)> = mags
            .iter()
            .enumerate()
            .map(|(b, &m)| (analyzer.bin_frequency(b, rate), m))
            .filter(|(f, _)| *f >= f_low && *f <= f_high)
            .collect();

        let mag_sum: f64 = band_bins.iter().map(|(_, m)| m).sum();
        if !band_bins.is_empty() && mag_sum > 0.0 {
            let centroid =
                band_bins.iter().map(|(f, m)| f * m).sum::<f64>() / mag_sum;
            centroids.push(((centroid - f_low) / band_width).clamp(0.0, 1.0));

            let total_energy: f64 = band_bins.iter().map(|(_, m)| m * m).sum();
            let threshold = ROLLOFF_PERCENT * total_energy;
            let mut cumulative = 0.0;
            for (f, m) in &band_bins {
                cumulative += m * m;
                if cumulative >= threshold {
                    rolloffs.push(((f - f_low) / band_width).clamp(0.0, 1.0));
                    break;
                }
            }
        }

        i += hop;
    }

    (dsp::mean(&centroids), dsp::mean(&rolloffs))
}

pub fn full_spectrum(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.harmonics_full_spectrum;
    let labels = ctx.full_spectrum_labels();
    let mut grid = GridBuilder::new("harmonics_full_spectrum", &labels, ctx.chunks.len());
    grid.touch("spectral_flatness_ratio");

    let analyzer = FftAnalyzer::new(params.fft_size);
    let hop = params.hop_size.max(1);

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

        // Flatness is measured only up to the band limit; above it lossy
        // codecs roll off and would skew the ratio.
        let bin_limit = ((params.fft_size / 2) as f64 * params.band_limit_hz / (rate / 2.0))
            as usize;
        let bin_limit = bin_limit.min(params.fft_size / 2 + 1).max(1);

        let mut flatness_values = Vec::new();
        let mut i = 0;
        while i + params.fft_size < signal.len() {
            let mags = analyzer.magnitudes(&signal[i..i + params.fft_size]);
            flatness_values.push(spectral_flatness(&mags[..bin_limit]));
            i += hop;
        }

        let avg = dsp::mean(&flatness_values);
        grid.set(
            "spectral_flatness_ratio",
            0,
            ci,
            avg.map(|v| dsp::round_to(v, 6)),
        );
    }

    grid.build()
}

/// Geometric over arithmetic mean of the magnitude spectrum. 1.0 for white
/// noise, near 0 for a pure tone.
pub fn spectral_flatness(magnitudes: &[f64]) -> f64 {
    if magnitudes.is_empty() {
        return 0.0;
    }
    let floor = 1e-12;
    let log_sum: f64 = magnitudes.iter().map(|&m| m.max(floor).ln()).sum();
    let geo_mean = (log_sum / magnitudes.len() as f64).exp();
    let arith_mean = magnitudes.iter().sum::<f64>() / magnitudes.len() as f64;
    if arith_mean == 0.0 {
        0.0
    } else {
        geo_mean / arith_mean
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
    fn test_flatness_of_flat_spectrum_is_one() {
        let flat = vec![3.0; 64];
        assert!((spectral_flatness(&flat) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_flatness_of_tonal_spectrum_is_low() {
        let mut tonal = vec![1e-6; 64];
        tonal[10] = 100.0;
        assert!(spectral_flatness(&tonal) < 0.1);
    }

    #[test]
    fn test_flatness_of_empty_spectrum() {
        assert_eq!(spectral_flatness(&[]), 0.0);
    }

    #[test]
    fn test_centroid_tracks_tone_position() {
        let rate = 44100.0;
        let analyzer = FftAnalyzer::new(4096);

        // Tone near the bottom of a 1k-4k band
        let low_tone = sine(1200.0, rate, 44100);
        let (centroid_low, _) =
            band_spectral_fractions(&low_tone, &analyzer, 2048, rate, 1000.0, 4000.0);
        // Tone near the top
        let high_tone = sine(3800.0, rate, 44100);
        let (centroid_high, _) =
            band_spectral_fractions(&high_tone, &analyzer, 2048, rate, 1000.0, 4000.0);

        assert!(centroid_low.unwrap() < 0.4);
        assert!(centroid_high.unwrap() > 0.6);
    }

    #[test]
    fn test_fractions_none_for_short_signal() {
        let analyzer = FftAnalyzer::new(4096);
        let short = vec![0.1; 100];
        let (c, r) = band_spectral_fractions(&short, &analyzer, 2048, 44100.0, 1000.0, 4000.0);
        assert_eq!(c, None);
        assert_eq!(r, None);
    }
}
