//! Per-track analysis pipeline and the parallel library driver.
//!
//! A track run loads its cached document, segments the audio, runs the
//! modules that need running, merges their results and saves once at the
//! end. A cached module is skipped unless it is on the always-run list, so
//! re-runs only pay for what changed.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;

use crate::bands::BandPlan;
use crate::config::AppConfig;
use crate::cube::{CubeError, MetricsDocument, TrackMeta};
use crate::discover::Track;
use crate::modules::{AnalysisModule, ModuleContext, ModuleError, MODULE_ORDER};
use crate::segmenter::{self, SegmentError};
use crate::store::{self, StoreError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error(transparent)]
    Cube(#[from] CubeError),
    #[error("no chunks produced for track")]
    NoChunks,
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Run-wide options resolved from the CLI.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Module names that run even when cached (config `always_run` plus
    /// any `--force` flags).
    pub always_run: Vec<String>,
    /// Overwrite unparseable metrics documents instead of failing.
    pub discard_corrupt: bool,
}

/// Whether a module should execute this run: it runs when its results are
/// absent from the document, or when it is on the always-run list.
pub fn should_run(module: AnalysisModule, document: &MetricsDocument, always_run: &[String]) -> bool {
    !document.has_module(module.name()) || always_run.iter().any(|n| n == module.name())
}

/// What a single track run did.
#[derive(Debug)]
pub struct TrackOutcome {
    pub track: String,
    pub modules_run: usize,
    pub saved: bool,
}

pub fn process_track(
    track: &Track,
    output_dir: &Path,
    config: &AppConfig,
    options: &RunOptions,
) -> Result<TrackOutcome, PipelineError> {
    let output_root = track.output_root(output_dir);
    let band_plan = BandPlan::new(
        config.multiband.cutoff_low_hz,
        config.multiband.cutoff_high_hz,
        config.multiband.bands,
    );

    let segmentation = segmenter::segment_track(
        track,
        &output_root,
        &config.segmenter.sox_path,
        &config.segmenter.chunk_duration,
    )?;
    if segmentation.chunks.is_empty() {
        return Err(PipelineError::NoChunks);
    }

    let meta = TrackMeta {
        name: track.name.clone(),
        chunk_count: segmentation.chunks.len(),
        chunk_duration_secs: segmentation.chunk_duration_secs,
        bands: band_plan.labels(),
    };

    let mut document = match store::load(&output_root, options.discard_corrupt)? {
        Some(cached) if cached.track.chunk_count == meta.chunk_count
            && cached.track.bands == meta.bands =>
        {
            cached
        }
        Some(cached) => {
            // The grid changed shape (different chunking or band plan);
            // cached results no longer line up and must be rebuilt.
            log::warn!(
                "{}: cached results cover {} chunks x {} bands, current run needs {} x {}; discarding cache",
                track.name,
                cached.track.chunk_count,
                cached.track.bands.len(),
                meta.chunk_count,
                meta.bands.len()
            );
            MetricsDocument::new(meta.clone())
        }
        None => MetricsDocument::new(meta.clone()),
    };
    document.track = meta;

    let mut modules_run = 0usize;
    for module in MODULE_ORDER {
        if !should_run(module, &document, &options.always_run) {
            log::debug!("{}: {} cached, skipping", track.name, module.name());
            continue;
        }
        log::info!("{}: running {}", track.name, module.name());
        let ctx = ModuleContext {
            chunks: &segmentation.chunks,
            band_plan: &band_plan,
            config,
            document: &document,
        };
        let entry = module.run(&ctx)?;
        document.merge_module(entry);
        modules_run += 1;
    }

    // Nothing ran, nothing to write: the document on disk is already
    // current and stays byte-identical.
    let saved = if modules_run > 0 {
        document.verify_coverage()?;
        store::save(&output_root, &document)?;
        true
    } else {
        false
    };

    Ok(TrackOutcome {
        track: track.name.clone(),
        modules_run,
        saved,
    })
}

/// Library-level result counts.
#[derive(Debug, Default)]
pub struct LibrarySummary {
    pub processed: usize,
    pub failed: usize,
}

/// Process every track on a worker pool, isolating per-track failures.
pub fn process_library(
    tracks: &[Track],
    output_dir: &Path,
    config: &AppConfig,
    options: &RunOptions,
) -> Result<LibrarySummary, PipelineError> {
    let workers = config.resolve_workers();
    log::info!("Processing {} tracks on {} workers", tracks.len(), workers);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?;

    let bar = ProgressBar::new(tracks.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );

    let outcomes: Vec<Result<TrackOutcome, (String, PipelineError)>> = pool.install(|| {
        tracks
            .par_iter()
            .map(|track| {
                bar.set_message(track.name.clone());
                let result = process_track(track, output_dir, config, options)
                    .map_err(|e| (track.name.clone(), e));
                bar.inc(1);
                result
            })
            .collect()
    });
    bar.finish_and_clear();

    let mut summary = LibrarySummary::default();
    for outcome in outcomes {
        match outcome {
            Ok(o) => {
                summary.processed += 1;
                if o.modules_run > 0 {
                    log::info!("{}: {} modules run", o.track, o.modules_run);
                } else {
                    log::info!("{}: up to date", o.track);
                }
            }
            Err((name, e)) => {
                summary.failed += 1;
                log::error!("{name}: {e}");
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{BandSeries, MetricSeries, ModuleEntry};

    fn doc_with(module: &str) -> MetricsDocument {
        let mut doc = MetricsDocument::new(TrackMeta {
            name: "t.wav".to_string(),
            chunk_count: 1,
            chunk_duration_secs: 30.0,
            bands: vec!["20Hz-65Hz".to_string()],
        });
        doc.merge_module(ModuleEntry {
            module: module.to_string(),
            metrics: vec![MetricSeries {
                metric: "x".to_string(),
                bands: vec![BandSeries {
                    band: "20Hz-65Hz".to_string(),
                    values: vec![Some(1.0)],
                }],
            }],
        });
        doc
    }

    #[test]
    fn test_should_run_absent_module() {
        let doc = doc_with("dynamics");
        assert!(should_run(AnalysisModule::Sparkle, &doc, &[]));
    }

    #[test]
    fn test_should_skip_cached_module() {
        let doc = doc_with("dynamics");
        assert!(!should_run(AnalysisModule::Dynamics, &doc, &[]));
    }

    #[test]
    fn test_always_run_overrides_cache() {
        let doc = doc_with("dynamics");
        let always = vec!["dynamics".to_string()];
        assert!(should_run(AnalysisModule::Dynamics, &doc, &always));
    }

    fn full_entry(module: &str, metric: &str, bands: &[String], fill: f64) -> ModuleEntry {
        ModuleEntry {
            module: module.to_string(),
            metrics: vec![MetricSeries {
                metric: metric.to_string(),
                bands: bands
                    .iter()
                    .map(|b| BandSeries {
                        band: b.clone(),
                        values: vec![Some(fill); 3],
                    })
                    .collect(),
            }],
        }
    }

    fn module_json(raw: &str, module: &str) -> String {
        let doc: serde_json::Value = serde_json::from_str(raw).unwrap();
        let entry = doc["modules"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["module"] == module)
            .unwrap();
        serde_json::to_string_pretty(entry).unwrap()
    }

    // Second run over a cached document with only dynamics forced: the
    // stereo_width subtree on disk must come out byte-identical.
    #[test]
    fn test_forced_rerun_leaves_cached_module_bytes_unchanged() {
        let bands: Vec<String> = [
            "20Hz-65Hz",
            "65Hz-212Hz",
            "212Hz-692Hz",
            "692Hz-2257Hz",
            "2257Hz-7360Hz",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let mut doc = MetricsDocument::new(TrackMeta {
            name: "t.wav".to_string(),
            chunk_count: 3,
            chunk_duration_secs: 30.0,
            bands: bands.clone(),
        });
        doc.merge_module(full_entry("stereo_width", "width_ratio", &bands, 0.5));
        doc.merge_module(full_entry("dynamics", "crest_factor_db", &bands, 12.0));
        doc.verify_coverage().unwrap();

        let dir = tempfile::tempdir().unwrap();
        store::save(dir.path(), &doc).unwrap();
        let first = std::fs::read_to_string(store::metrics_path(dir.path())).unwrap();

        let mut reloaded = store::load(dir.path(), false).unwrap().unwrap();
        let always = vec!["dynamics".to_string()];
        assert!(!should_run(AnalysisModule::StereoWidth, &reloaded, &always));
        assert!(should_run(AnalysisModule::Dynamics, &reloaded, &always));

        reloaded.merge_module(full_entry("dynamics", "crest_factor_db", &bands, 9.0));
        store::save(dir.path(), &reloaded).unwrap();
        let second = std::fs::read_to_string(store::metrics_path(dir.path())).unwrap();

        assert_eq!(
            module_json(&first, "stereo_width"),
            module_json(&second, "stereo_width")
        );
        assert_ne!(
            module_json(&first, "dynamics"),
            module_json(&second, "dynamics")
        );
    }
}
