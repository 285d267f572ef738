//! Metrics document model: the per-track results cube and its merge rules.
//!
//! The cube is {module -> {metric -> {(chunk, band) -> value}}}. We keep
//! every level as an ordered Vec rather than a map so that serialization
//! order is stable and a re-run without changes produces byte-identical
//! JSON. Unknown top-level document fields are preserved through
//! load/merge/save.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CubeError {
    #[error("module {module}: metric {metric} band {band} has {got} chunks, expected {expected}")]
    IncompleteCoverage {
        module: String,
        metric: String,
        band: String,
        got: usize,
        expected: usize,
    },
}

/// Track-level metadata stored alongside the cube.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackMeta {
    pub name: String,
    pub chunk_count: usize,
    pub chunk_duration_secs: f64,
    /// Band labels in axis order, full-spectrum excluded.
    pub bands: Vec<String>,
}

/// Chunk-indexed values for one (metric, band) pair. `None` marks a chunk
/// the module could not evaluate (e.g. a mono chunk for a stereo metric).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BandSeries {
    pub band: String,
    pub values: Vec<Option<f64>>,
}

/// One metric across all of its bands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSeries {
    pub metric: String,
    pub bands: Vec<BandSeries>,
}

/// One module's complete sub-tree of the cube.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleEntry {
    pub module: String,
    pub metrics: Vec<MetricSeries>,
}

/// The on-disk metrics document for one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsDocument {
    pub track: TrackMeta,
    pub modules: Vec<ModuleEntry>,
    /// Fields written by other tools or future versions; carried verbatim.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MetricsDocument {
    pub fn new(track: TrackMeta) -> Self {
        Self {
            track,
            modules: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.module == name)
    }

    pub fn module(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.module == name)
    }

    /// Replace the named module's sub-tree, or append it if absent.
    /// Other modules' results are never touched.
    pub fn merge_module(&mut self, entry: ModuleEntry) {
        match self.modules.iter_mut().find(|m| m.module == entry.module) {
            Some(existing) => *existing = entry,
            None => self.modules.push(entry),
        }
    }

    /// All (module, metric) names present, in document order, as
    /// `module::metric` keys.
    pub fn metric_keys(&self) -> Vec<String> {
        self.modules
            .iter()
            .flat_map(|m| {
                m.metrics
                    .iter()
                    .map(move |s| format!("{}::{}", m.module, s.metric))
            })
            .collect()
    }

    /// Look up one (metric, band) series by `module::metric` key.
    pub fn series(&self, metric_key: &str, band: &str) -> Option<&BandSeries> {
        let (module, metric) = metric_key.split_once("::")?;
        self.module(module)?
            .metrics
            .iter()
            .find(|s| s.metric == metric)?
            .bands
            .iter()
            .find(|b| b.band == band)
    }

    /// Check every series in every module covers exactly `chunk_count`
    /// chunks and the expected band set.
    pub fn verify_coverage(&self) -> Result<(), CubeError> {
        for module in &self.modules {
            for metric in &module.metrics {
                for band in &metric.bands {
                    if band.values.len() != self.track.chunk_count {
                        return Err(CubeError::IncompleteCoverage {
                            module: module.module.clone(),
                            metric: metric.metric.clone(),
                            band: band.band.clone(),
                            got: band.values.len(),
                            expected: self.track.chunk_count,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Accumulates one module's results with guaranteed chunk x band coverage.
/// Every (metric, band) cell starts as `None`; the module fills in what it
/// can. `build` emits bands and metrics in first-seen order.
pub struct GridBuilder {
    module: String,
    bands: Vec<String>,
    chunk_count: usize,
    metrics: Vec<MetricSeries>,
}

impl GridBuilder {
    pub fn new(module: &str, bands: &[String], chunk_count: usize) -> Self {
        Self {
            module: module.to_string(),
            bands: bands.to_vec(),
            chunk_count,
            metrics: Vec::new(),
        }
    }

    /// Set one cell. The metric is registered on first use with a full
    /// `None` grid so coverage holds even if later chunks fail.
    pub fn set(&mut self, metric: &str, band_idx: usize, chunk_idx: usize, value: Option<f64>) {
        debug_assert!(band_idx < self.bands.len());
        debug_assert!(chunk_idx < self.chunk_count);
        let series = self.metric_mut(metric);
        series.bands[band_idx].values[chunk_idx] = value;
    }

    /// Register a metric without setting any cells yet.
    pub fn touch(&mut self, metric: &str) {
        self.metric_mut(metric);
    }

    fn metric_mut(&mut self, metric: &str) -> &mut MetricSeries {
        if let Some(pos) = self.metrics.iter().position(|s| s.metric == metric) {
            return &mut self.metrics[pos];
        }
        self.metrics.push(MetricSeries {
            metric: metric.to_string(),
            bands: self
                .bands
                .iter()
                .map(|b| BandSeries {
                    band: b.clone(),
                    values: vec![None; self.chunk_count],
                })
                .collect(),
        });
        let last = self.metrics.len() - 1;
        &mut self.metrics[last]
    }

    pub fn build(self) -> ModuleEntry {
        ModuleEntry {
            module: self.module,
            metrics: self.metrics,
        }
    }
}

/// Time label for one chunk: "MM:SS-MM:SS" from the chunk index and
/// chunk duration.
pub fn chunk_time_label(chunk_idx: usize, chunk_duration_secs: f64) -> String {
    let start = (chunk_idx as f64 * chunk_duration_secs).round() as u64;
    let end = ((chunk_idx + 1) as f64 * chunk_duration_secs).round() as u64;
    format!(
        "{:02}:{:02}-{:02}:{:02}",
        start / 60,
        start % 60,
        end / 60,
        end % 60
    )
}
