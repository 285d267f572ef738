//! Frequency response balance: each band's energy density relative to a
//! uniform distribution of the chunk's energy across the analysis range,
//! in dB. Positive means the band carries more than its share.

use super::audio::ChunkAudio;
use super::dsp::{self, FftAnalyzer};
use super::ModuleContext;
use crate::cube::{GridBuilder, ModuleEntry};

/// Floor reported for bands with no measurable energy.
const EMPTY_BAND_DB: f64 = -60.0;

pub fn run(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.freq_response;
    let multiband = &ctx.config.multiband;
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("freq_response", &labels, ctx.chunks.len());
    grid.touch("avg_magnitude_db");

    let analyzer = FftAnalyzer::new(params.fft_size);
    let step = ((params.fft_size as f64) * (1.0 - params.overlap)) as usize;
    let step = step.max(1);
    let total_bandwidth = multiband.cutoff_high_hz - multiband.cutoff_low_hz;

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

        // Average magnitude spectrum over all frames of the chunk.
        let mut avg_mags: Vec<f64> = Vec::new();
        let mut frames = 0usize;
        let mut i = 0;
        while i + params.fft_size < signal.len() {
            let mags = analyzer.magnitudes(&signal[i..i + params.fft_size]);
            if avg_mags.is_empty() {
                avg_mags = mags;
            } else {
                for (acc, m) in avg_mags.iter_mut().zip(&mags) {
                    *acc += m;
                }
            }
            frames += 1;
            i += step;
        }
        if frames == 0 {
            continue;
        }
        for m in &mut avg_mags {
            *m /= frames as f64;
        }

        let bin_freq = |b: usize| analyzer.bin_frequency(b, rate);
        let total_energy: f64 = avg_mags
            .iter()
            .enumerate()
            .filter(|(b, _)| {
                let f = bin_freq(*b);
                f >= multiband.cutoff_low_hz && f <= multiband.cutoff_high_hz
            })
            .map(|(_, m)| m)
            .sum();
        let total_energy = if total_energy == 0.0 { 1e-12 } else { total_energy };
        let expected_density = total_energy / total_bandwidth;

        for (bi, band) in ctx.band_plan.ranges().iter().enumerate() {
            let band_energy: f64 = avg_mags
                .iter()
                .enumerate()
                .filter(|(b, _)| {
                    let f = bin_freq(*b);
                    f >= band.low_hz && f <= band.high_hz
                })
                .map(|(_, m)| m)
                .sum();

            let density = band_energy / (band.high_hz - band.low_hz);
            let balance_db = if density > 0.0 && expected_density > 0.0 {
                20.0 * (density / expected_density).log10()
            } else {
                EMPTY_BAND_DB
            };

            grid.set("avg_magnitude_db", bi, ci, Some(dsp::round_to(balance_db, 2)));
        }
    }

    grid.build()
}
