//! Sparkle: average frame RMS of the band-filtered signal, compensated for
//! band width so narrow high bands compare fairly against wide ones.
//! Bands entirely below the configured minimum frequency report zero.

use super::audio::ChunkAudio;
use super::dsp;
use super::ModuleContext;
use crate::cube::{GridBuilder, ModuleEntry};

pub fn run(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.sparkle;
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("sparkle", &labels, ctx.chunks.len());
    grid.touch("sparkle");

    let total_octaves = ctx.band_plan.total_octaves();

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
        let frame_size = (rate * params.frame_ms as f64 / 1000.0) as usize;

        for (bi, band) in ctx.band_plan.ranges().iter().enumerate() {
            let value = if band.high_hz < params.min_frequency_hz {
                0.0
            } else {
                let mut band_signal = dsp::bandpass(&signal, rate, band.low_hz, band.high_hz);
                // Filter ringing can push past full scale; renormalize so
                // the transient RMS stays comparable across bands.
                let max_val = band_signal.iter().fold(0.0f64, |a, s| a.max(s.abs()));
                if max_val > 1.0 {
                    for s in &mut band_signal {
                        *s /= max_val;
                    }
                }
                let raw = transient_rms(&band_signal, frame_size);
                if raw > 0.0 {
                    let band_octaves = (band.high_hz / band.low_hz).log2();
                    raw * total_octaves / band_octaves
                } else {
                    raw
                }
            };
            grid.set("sparkle", bi, ci, Some(dsp::round_to(value, 6)));
        }
    }

    grid.build()
}

/// Mean of per-frame RMS values over non-overlapping frames.
fn transient_rms(signal: &[f64], frame_size: usize) -> f64 {
    if frame_size == 0 || signal.is_empty() {
        return 0.0;
    }
    let frame_rms: Vec<f64> = signal
        .chunks(frame_size)
        .map(|frame| {
            (frame.iter().map(|s| s * s).sum::<f64>() / frame.len() as f64).sqrt()
        })
        .collect();
    dsp::mean(&frame_rms).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_rms_of_constant_signal() {
        let signal = vec![0.5; 1000];
        assert!((transient_rms(&signal, 100) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_transient_rms_of_silence() {
        assert_eq!(transient_rms(&vec![0.0; 1000], 100), 0.0);
        assert_eq!(transient_rms(&[], 100), 0.0);
        assert_eq!(transient_rms(&[1.0], 0), 0.0);
    }

    #[test]
    fn test_transient_rms_bursty_vs_steady() {
        // Same total energy, but the bursty signal has higher mean frame RMS
        // than a signal with the energy smeared thin would suggest relative
        // to its peak frames.
        let mut bursty = vec![0.0; 1000];
        for s in bursty.iter_mut().take(100) {
            *s = 1.0;
        }
        let steady = vec![0.1f64.sqrt(); 1000];
        let b = transient_rms(&bursty, 100);
        let s = transient_rms(&steady, 100);
        assert!((b - 0.1).abs() < 1e-9);
        assert!(s > b);
    }
}
