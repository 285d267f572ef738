//! Derived modules. These consume earlier modules' results from the
//! in-progress document, so their cached inputs can be reused without
//! re-running the source analysis.

use super::audio::ChunkAudio;
use super::dsp::{self, FftAnalyzer};
use super::{ModuleContext, ModuleError};
use crate::bands::FULL_SPECTRUM;
use crate::cube::{GridBuilder, ModuleEntry};

/// Broadcast the full-spectrum crest factor statistics across every band,
/// giving the renderer a band-shaped view of overall dynamics.
///
/// Depends on `dynamics_full_spectrum` (values) and `quantization` (grid
/// shape check; both must describe the same chunk axis).
pub fn dynamic_range(ctx: &ModuleContext) -> Result<ModuleEntry, ModuleError> {
    const MODULE: &str = "dynamic_range";

    require(ctx, MODULE, "quantization")?;
    require(ctx, MODULE, "dynamics_full_spectrum")?;

    let avg = dependency_series(ctx, MODULE, "dynamics_full_spectrum::avg_crest_factor_db")?;
    let std = dependency_series(ctx, MODULE, "dynamics_full_spectrum::crest_factor_std_db")?;

    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new(MODULE, &labels, ctx.chunks.len());
    grid.touch("overall_avg_crest_factor_db");
    grid.touch("overall_std_crest_factor_db");

    for bi in 0..labels.len() {
        for ci in 0..ctx.chunks.len() {
            grid.set("overall_avg_crest_factor_db", bi, ci, avg[ci]);
            grid.set("overall_std_crest_factor_db", bi, ci, std[ci]);
        }
    }

    Ok(grid.build())
}

/// Consolidated quality metrics: per-band quantization efficiency, plus
/// chunk-level SINAD and spectral flatness broadcast across bands.
///
/// Depends on `quantization` and `harmonics_full_spectrum`; SINAD is
/// computed here directly from the chunk audio, once per chunk.
pub fn audio_quality(ctx: &ModuleContext) -> Result<ModuleEntry, ModuleError> {
    const MODULE: &str = "audio_quality";

    require(ctx, MODULE, "quantization")?;
    require(ctx, MODULE, "harmonics_full_spectrum")?;

    let flatness = dependency_series(ctx, MODULE, "harmonics_full_spectrum::spectral_flatness_ratio")?;

    let labels = ctx.band_labels();
    let mut grid = GridBuilder::new(MODULE, &labels, ctx.chunks.len());
    grid.touch("quantization_efficiency");
    grid.touch("spectral_flatness_ratio");
    grid.touch("avg_sinad_db");
    grid.touch("min_sinad_db");
    grid.touch("max_sinad_db");
    grid.touch("std_sinad_db");

    // SINAD once per chunk; every band gets the same values.
    let sinad: Vec<SinadStats> = ctx.chunks.iter().map(|c| chunk_sinad(ctx, c)).collect();

    for (bi, band) in labels.iter().enumerate() {
        let bits = banded_dependency(ctx, MODULE, "quantization::estimated_bits", band)?;
        let levels = banded_dependency(ctx, MODULE, "quantization::unique_levels", band)?;

        for ci in 0..ctx.chunks.len() {
            let efficiency = match (bits[ci], levels[ci]) {
                (Some(b), Some(l)) => {
                    let theoretical = if b > 0.0 { 2f64.powf(b) } else { 1.0 };
                    Some(dsp::round_to(l / theoretical, 4))
                }
                _ => None,
            };
            grid.set("quantization_efficiency", bi, ci, efficiency);
            grid.set("spectral_flatness_ratio", bi, ci, flatness[ci]);

            let s = &sinad[ci];
            let r2 = |v: Option<f64>| v.map(|x| dsp::round_to(x, 2));
            grid.set("avg_sinad_db", bi, ci, r2(s.avg));
            grid.set("min_sinad_db", bi, ci, r2(s.min));
            grid.set("max_sinad_db", bi, ci, r2(s.max));
            grid.set("std_sinad_db", bi, ci, r2(s.std));
        }
    }

    Ok(grid.build())
}

fn require(
    ctx: &ModuleContext,
    module: &'static str,
    dependency: &'static str,
) -> Result<(), ModuleError> {
    if ctx.document.has_module(dependency) {
        Ok(())
    } else {
        Err(ModuleError::MissingDependency { module, dependency })
    }
}

/// One full-spectrum dependency metric, chunk-indexed.
fn dependency_series(
    ctx: &ModuleContext,
    module: &'static str,
    metric_key: &'static str,
) -> Result<Vec<Option<f64>>, ModuleError> {
    let series = ctx
        .document
        .series(metric_key, FULL_SPECTRUM)
        .ok_or(ModuleError::MissingDependency {
            module,
            dependency: dependency_name(metric_key),
        })?;
    if series.values.len() != ctx.chunks.len() {
        return Err(ModuleError::DependencyShape {
            module,
            dependency: dependency_name(metric_key),
        });
    }
    Ok(series.values.clone())
}

/// One banded dependency metric for a specific band, chunk-indexed.
fn banded_dependency(
    ctx: &ModuleContext,
    module: &'static str,
    metric_key: &'static str,
    band: &str,
) -> Result<Vec<Option<f64>>, ModuleError> {
    let series = ctx
        .document
        .series(metric_key, band)
        .ok_or(ModuleError::DependencyShape {
            module,
            dependency: dependency_name(metric_key),
        })?;
    if series.values.len() != ctx.chunks.len() {
        return Err(ModuleError::DependencyShape {
            module,
            dependency: dependency_name(metric_key),
        });
    }
    Ok(series.values.clone())
}

fn dependency_name(metric_key: &'static str) -> &'static str {
    metric_key.split("::").next().unwrap_or(metric_key)
}

struct SinadStats {
    avg: Option<f64>,
    min: Option<f64>,
    max: Option<f64>,
    std: Option<f64>,
}

const EMPTY_SINAD: SinadStats = SinadStats {
    avg: None,
    min: None,
    max: None,
    std: None,
};

/// Signal-to-noise-and-distortion per chunk: total spectral energy over
/// the projected noise floor energy, averaged over frames.
fn chunk_sinad(ctx: &ModuleContext, chunk: &std::path::Path) -> SinadStats {
    let params = &ctx.config.modules.sinad;

    let audio = match ChunkAudio::load(chunk) {
        Ok(a) => a,
        Err(e) => {
            log::warn!("{}: {}", chunk.display(), e);
            return EMPTY_SINAD;
        }
    };
    let signal = audio.mono();

    let analyzer = FftAnalyzer::new(params.fft_size);
    let step = ((params.fft_size as f64) * (1.0 - params.overlap)) as usize;
    let step = step.max(1);

    let mut frame_sinads = Vec::new();
    let mut i = 0;
    while i + params.fft_size < signal.len() {
        let mags = analyzer.magnitudes(&signal[i..i + params.fft_size]);
        let total_energy: f64 = mags.iter().map(|m| m * m).sum();
        if total_energy > 0.0 {
            let mut sorted = mags.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let floor_samples =
                ((sorted.len() as f64 * params.noise_percentile / 100.0) as usize).max(1);
            let noise_mag = sorted[..floor_samples].iter().sum::<f64>() / floor_samples as f64;
            // Project the floor magnitude across every bin
            let noise_energy = noise_mag * noise_mag * mags.len() as f64;
            if noise_energy > 0.0 {
                frame_sinads.push(10.0 * (total_energy / noise_energy).log10());
            }
        }
        i += step;
    }

    if frame_sinads.is_empty() {
        return EMPTY_SINAD;
    }

    SinadStats {
        avg: dsp::mean(&frame_sinads),
        min: frame_sinads.iter().cloned().reduce(f64::min),
        max: frame_sinads.iter().cloned().reduce(f64::max),
        std: dsp::std_dev(&frame_sinads),
    }
}
