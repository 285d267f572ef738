//! Dynamics modules: peak, RMS and crest-factor statistics, per band and
//! over the unfiltered signal.

use super::audio::ChunkAudio;
use super::dsp;
use super::ModuleContext;
use crate::cube::{GridBuilder, ModuleEntry};

const BANDED_METRICS: [&str; 7] = [
    "peak_dbfs",
    "rms_dbfs",
    "crest_factor_db",
    "peak_dyn_range_db",
    "rms_dyn_range_db",
    "avg_crest_factor_db",
    "std_crest_factor_db",
];

const FULL_METRICS: [&str; 7] = [
    "peak_dbfs",
    "rms_dbfs",
    "crest_factor_db",
    "peak_dyn_range_db",
    "rms_dyn_range_db",
    "avg_crest_factor_db",
    "crest_factor_std_db",
];

/// Dynamic range cap used when a frame minimum sits at the noise floor.
const DYN_RANGE_CAP_DB: f64 = 120.0;
const NOISE_FLOOR: f64 = 1e-12;

struct DynamicsStats {
    peak_dbfs: Option<f64>,
    rms_dbfs: Option<f64>,
    crest_factor_db: Option<f64>,
    peak_dyn_range_db: Option<f64>,
    rms_dyn_range_db: Option<f64>,
    avg_crest_factor_db: Option<f64>,
    std_crest_factor_db: Option<f64>,
}

/// Frame-by-frame dynamics over one signal. `log_domain_crest` selects how
/// frame crest factors are aggregated: the banded variant averages the dB
/// values, the full-spectrum variant averages the linear ratios first.
fn analyze(signal: &[f64], frame_size: usize, log_domain_crest: bool) -> DynamicsStats {
    let peak = dsp::peak_dbfs(signal);
    let rms = dsp::rms_dbfs(signal);
    let crest = match (peak, rms) {
        (Some(p), Some(r)) => Some(p - r),
        _ => None,
    };

    let mut frame_peaks = Vec::new();
    let mut frame_rms = Vec::new();
    if frame_size > 0 {
        for frame in signal.chunks(frame_size) {
            let p = frame.iter().fold(0.0f64, |a, s| a.max(s.abs()));
            let r = (frame.iter().map(|s| s * s).sum::<f64>() / frame.len() as f64).sqrt();
            if p > 0.0 {
                frame_peaks.push(p);
            }
            if r > 0.0 {
                frame_rms.push(r);
            }
        }
    }

    if frame_peaks.is_empty() || frame_rms.is_empty() {
        return DynamicsStats {
            peak_dbfs: peak,
            rms_dbfs: rms,
            crest_factor_db: crest,
            peak_dyn_range_db: None,
            rms_dyn_range_db: None,
            avg_crest_factor_db: None,
            std_crest_factor_db: None,
        };
    }

    let range_db = |min: f64, max: f64| {
        if min > NOISE_FLOOR {
            20.0 * (max / min).log10()
        } else {
            DYN_RANGE_CAP_DB.min(20.0 * (max / NOISE_FLOOR).log10())
        }
    };
    let min_peak = frame_peaks.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_peak = frame_peaks.iter().cloned().fold(0.0f64, f64::max);
    let min_rms = frame_rms.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_rms = frame_rms.iter().cloned().fold(0.0f64, f64::max);

    let (avg_crest, std_crest) = if log_domain_crest {
        let crests_db: Vec<f64> = frame_peaks
            .iter()
            .zip(&frame_rms)
            .map(|(p, r)| 20.0 * (p / r.max(NOISE_FLOOR)).log10())
            .collect();
        let std = if crests_db.len() > 1 {
            dsp::std_dev(&crests_db)
        } else {
            None
        };
        (dsp::mean(&crests_db), std)
    } else {
        let crests: Vec<f64> = frame_peaks
            .iter()
            .zip(&frame_rms)
            .map(|(p, r)| p / r.max(NOISE_FLOOR))
            .collect();
        let avg = dsp::mean(&crests).map(|m| 20.0 * m.log10());
        let std = if crests.len() > 1 {
            dsp::std_dev(&crests).map(|s| 20.0 * (s + NOISE_FLOOR).log10())
        } else {
            None
        };
        (avg, std)
    };

    DynamicsStats {
        peak_dbfs: peak,
        rms_dbfs: rms,
        crest_factor_db: crest,
        peak_dyn_range_db: Some(range_db(min_peak, max_peak)),
        rms_dyn_range_db: Some(range_db(min_rms, max_rms)),
        avg_crest_factor_db: avg_crest,
        std_crest_factor_db: std_crest,
    }
}

fn set_stats(grid: &mut GridBuilder, metrics: &[&str; 7], bi: usize, ci: usize, s: &DynamicsStats) {
    let r2 = |v: Option<f64>| v.map(|x| dsp::round_to(x, 2));
    grid.set(metrics[0], bi, ci, r2(s.peak_dbfs));
    grid.set(metrics[1], bi, ci, r2(s.rms_dbfs));
    grid.set(metrics[2], bi, ci, r2(s.crest_factor_db));
    grid.set(metrics[3], bi, ci, r2(s.peak_dyn_range_db));
    grid.set(metrics[4], bi, ci, r2(s.rms_dyn_range_db));
    grid.set(metrics[5], bi, ci, r2(s.avg_crest_factor_db));
    grid.set(metrics[6], bi, ci, r2(s.std_crest_factor_db));
}

pub fn banded(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.dynamics;
    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new("dynamics", &labels, ctx.chunks.len());
    for m in BANDED_METRICS {
        grid.touch(m);
    }

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
            let band_signal = dsp::bandpass(&signal, rate, band.low_hz, band.high_hz);
            let stats = analyze(&band_signal, frame_size, true);
            set_stats(&mut grid, &BANDED_METRICS, bi, ci, &stats);
        }
    }

    grid.build()
}

pub fn full_spectrum(ctx: &ModuleContext) -> ModuleEntry {
    let params = &ctx.config.modules.dynamics_full_spectrum;
    let labels = ctx.full_spectrum_labels();
    let mut grid = GridBuilder::new("dynamics_full_spectrum", &labels, ctx.chunks.len());
    for m in FULL_METRICS {
        grid.touch(m);
    }

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

        let stats = analyze(&signal, frame_size, false);
        set_stats(&mut grid, &FULL_METRICS, 0, ci, &stats);
    }

    grid.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_signal_has_zero_crest() {
        let signal = vec![0.5; 4800];
        let stats = analyze(&signal, 480, true);
        assert!(stats.crest_factor_db.unwrap().abs() < 1e-9);
        assert!(stats.peak_dyn_range_db.unwrap().abs() < 1e-9);
        assert!(stats.avg_crest_factor_db.unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_silence_yields_empty_stats() {
        let stats = analyze(&vec![0.0; 4800], 480, true);
        assert_eq!(stats.peak_dbfs, None);
        assert_eq!(stats.rms_dbfs, None);
        assert_eq!(stats.crest_factor_db, None);
        assert_eq!(stats.peak_dyn_range_db, None);
    }

    #[test]
    fn test_impulse_has_high_crest() {
        let mut signal = vec![0.001; 4800];
        signal[100] = 1.0;
        let stats = analyze(&signal, 480, true);
        assert!(stats.crest_factor_db.unwrap() > 30.0);
    }

    #[test]
    fn test_quiet_loud_alternation_has_dynamic_range() {
        let mut signal = Vec::new();
        signal.extend(std::iter::repeat(0.01).take(480));
        signal.extend(std::iter::repeat(0.9).take(480));
        let stats = analyze(&signal, 480, true);
        // 0.9 / 0.01 is about 39 dB of RMS range
        let range = stats.rms_dyn_range_db.unwrap();
        assert!((range - 39.08).abs() < 0.5, "got {range}");
    }
}
