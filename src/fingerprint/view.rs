//! Data view for rendering: the normalized metric cube plus the axis
//! permutation machinery that maps (band, time, metric) onto (x, y, z).

use thiserror::Error;

use super::normalize::{self, MetricSpec};
use crate::cube::{chunk_time_label, MetricsDocument};

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("unknown axis permutation {0:?} (expected a 3-letter code over b/t/m)")]
    InvalidPermutation(String),
    #[error("no renderable metrics present in document")]
    NoMetrics,
    #[error("metric {metric} is present in module {module} but has no band {band}")]
    MissingSeries {
        module: String,
        metric: String,
        band: String,
    },
}

/// One of the three data dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Band,
    Time,
    Metric,
}

impl Axis {
    fn code(self) -> char {
        match self {
            Axis::Band => 'b',
            Axis::Time => 't',
            Axis::Metric => 'm',
        }
    }

    fn from_code(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'b' => Some(Axis::Band),
            't' => Some(Axis::Time),
            'm' => Some(Axis::Metric),
            _ => None,
        }
    }
}

/// Assignment of the three dimensions onto image X, Y and Z.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisPerm {
    pub x: Axis,
    pub y: Axis,
    pub z: Axis,
}

impl AxisPerm {
    /// Parse a code like "btm" (X=Band, Y=Time, Z=Metric). All three
    /// axes must appear exactly once.
    pub fn parse(code: &str) -> Result<Self, ViewError> {
        let chars: Vec<char> = code.chars().collect();
        let invalid = || ViewError::InvalidPermutation(code.to_string());
        if chars.len() != 3 {
            return Err(invalid());
        }
        let x = Axis::from_code(chars[0]).ok_or_else(invalid)?;
        let y = Axis::from_code(chars[1]).ok_or_else(invalid)?;
        let z = Axis::from_code(chars[2]).ok_or_else(invalid)?;
        if x == y || y == z || x == z {
            return Err(invalid());
        }
        Ok(Self { x, y, z })
    }

    pub fn code(&self) -> String {
        [self.x.code(), self.y.code(), self.z.code()].iter().collect()
    }

    /// All six permutations in the conventional order
    /// (btm, bmt, tbm, tmb, mbt, mtb).
    pub fn all() -> [AxisPerm; 6] {
        use Axis::{Band, Metric, Time};
        [
            AxisPerm { x: Band, y: Time, z: Metric },
            AxisPerm { x: Band, y: Metric, z: Time },
            AxisPerm { x: Time, y: Band, z: Metric },
            AxisPerm { x: Time, y: Metric, z: Band },
            AxisPerm { x: Metric, y: Band, z: Time },
            AxisPerm { x: Metric, y: Time, z: Band },
        ]
    }
}

/// The normalized cube: metric x band x time, with axis labels.
/// Values are already pushed through the metric normalization curves.
pub struct CubeView {
    pub bands: Vec<String>,
    pub times: Vec<String>,
    pub metrics: Vec<&'static MetricSpec>,
    /// Canonical-table index of each metric (drives hue).
    pub metric_indices: Vec<usize>,
    /// Indexed [metric][band][time].
    values: Vec<Option<f64>>,
}

impl CubeView {
    /// Build the view from a document. Only metrics with a normalization
    /// entry are included, in canonical table order; metrics whose module
    /// is absent from the document are skipped. A module that is present
    /// but missing a band the track metadata promises is an error.
    pub fn build(document: &MetricsDocument) -> Result<Self, ViewError> {
        let bands = document.track.bands.clone();
        let times: Vec<String> = (0..document.track.chunk_count)
            .map(|c| chunk_time_label(c, document.track.chunk_duration_secs))
            .collect();

        let mut metrics = Vec::new();
        let mut metric_indices = Vec::new();
        let mut values = Vec::new();

        for (table_idx, spec) in normalize::METRIC_TABLE.iter().enumerate() {
            let module = spec.key.split_once("::").map_or(spec.key, |(m, _)| m);
            if !document.has_module(module) {
                continue;
            }

            for band in &bands {
                let series =
                    document
                        .series(spec.key, band)
                        .ok_or_else(|| ViewError::MissingSeries {
                            module: module.to_string(),
                            metric: spec.key.to_string(),
                            band: band.clone(),
                        })?;
                for t in 0..times.len() {
                    let raw = series.values.get(t).copied().flatten();
                    values.push(raw.map(|v| spec.normalize(v)));
                }
            }

            metrics.push(spec);
            metric_indices.push(table_idx);
        }

        if metrics.is_empty() {
            return Err(ViewError::NoMetrics);
        }

        Ok(Self {
            bands,
            times,
            metrics,
            metric_indices,
            values,
        })
    }

    pub fn axis_len(&self, axis: Axis) -> usize {
        match axis {
            Axis::Band => self.bands.len(),
            Axis::Time => self.times.len(),
            Axis::Metric => self.metrics.len(),
        }
    }

    pub fn axis_labels(&self, axis: Axis) -> Vec<String> {
        match axis {
            Axis::Band => self.bands.clone(),
            Axis::Time => self.times.clone(),
            Axis::Metric => self.metrics.iter().map(|m| m.key.to_string()).collect(),
        }
    }

    /// Normalized value at (metric, band, time); `None` for holes.
    pub fn value(&self, metric: usize, band: usize, time: usize) -> Option<f64> {
        let idx = (metric * self.bands.len() + band) * self.times.len() + time;
        self.values[idx]
    }

    /// Value addressed through a permutation: (x, y, z) image coordinates.
    pub fn value_at(&self, perm: &AxisPerm, x: usize, y: usize, z: usize) -> Option<f64> {
        let pick = |axis: Axis| match axis {
            a if a == perm.x => x,
            a if a == perm.y => y,
            _ => z,
        };
        self.value(pick(Axis::Metric), pick(Axis::Band), pick(Axis::Time))
    }

    /// The metric a point at (x, y, z) belongs to, under a permutation.
    pub fn metric_at(&self, perm: &AxisPerm, x: usize, y: usize, z: usize) -> usize {
        match Axis::Metric {
            a if a == perm.x => x,
            a if a == perm.y => y,
            _ => z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{BandSeries, MetricSeries, MetricsDocument, ModuleEntry, TrackMeta};

    fn document() -> MetricsDocument {
        let bands = vec!["20Hz-200Hz".to_string(), "200Hz-2000Hz".to_string()];
        let mut doc = MetricsDocument::new(TrackMeta {
            name: "t.wav".to_string(),
            chunk_count: 3,
            chunk_duration_secs: 30.0,
            bands: bands.clone(),
        });
        doc.merge_module(ModuleEntry {
            module: "stereo_phase".to_string(),
            metrics: vec![MetricSeries {
                metric: "coherence".to_string(),
                bands: bands
                    .iter()
                    .enumerate()
                    .map(|(bi, b)| BandSeries {
                        band: b.clone(),
                        values: (0..3).map(|t| Some(0.1 * (bi * 3 + t) as f64)).collect(),
                    })
                    .collect(),
            }],
        });
        doc
    }

    #[test]
    fn test_perm_parse_and_code() {
        let perm = AxisPerm::parse("btm").unwrap();
        assert_eq!(perm.x, Axis::Band);
        assert_eq!(perm.y, Axis::Time);
        assert_eq!(perm.z, Axis::Metric);
        assert_eq!(perm.code(), "btm");
        assert_eq!(AxisPerm::parse("MTB").unwrap().code(), "mtb");
    }

    #[test]
    fn test_perm_rejects_bad_codes() {
        assert!(AxisPerm::parse("bt").is_err());
        assert!(AxisPerm::parse("bbt").is_err());
        assert!(AxisPerm::parse("xyz").is_err());
        assert!(AxisPerm::parse("btmm").is_err());
    }

    #[test]
    fn test_all_permutations_are_distinct() {
        let all = AxisPerm::all();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_view_includes_only_present_modules() {
        let view = CubeView::build(&document()).unwrap();
        assert_eq!(view.metrics.len(), 1);
        assert_eq!(view.metrics[0].key, "stereo_phase::coherence");
        assert_eq!(view.bands.len(), 2);
        assert_eq!(view.times.len(), 3);
        assert_eq!(view.times[0], "00:00-00:30");
    }

    #[test]
    fn test_view_values_are_normalized_and_indexed() {
        let view = CubeView::build(&document()).unwrap();
        // coherence is a plain clamp, so normalized == raw here
        assert_eq!(view.value(0, 0, 0), Some(0.0));
        assert_eq!(view.value(0, 1, 2), Some(0.5));
    }

    #[test]
    fn test_value_addressing_through_permutation() {
        let view = CubeView::build(&document()).unwrap();
        let perm = AxisPerm::parse("btm").unwrap();
        // x=band 1, y=time 2, z=metric 0
        assert_eq!(view.value_at(&perm, 1, 2, 0), view.value(0, 1, 2));
        assert_eq!(view.metric_at(&perm, 1, 2, 0), 0);

        let perm = AxisPerm::parse("mtb").unwrap();
        assert_eq!(view.value_at(&perm, 0, 2, 1), view.value(0, 1, 2));
    }

    #[test]
    fn test_empty_document_is_an_error() {
        let doc = MetricsDocument::new(TrackMeta {
            name: "t.wav".to_string(),
            chunk_count: 1,
            chunk_duration_secs: 30.0,
            bands: vec!["a".to_string()],
        });
        assert!(matches!(CubeView::build(&doc), Err(ViewError::NoMetrics)));
    }

    #[test]
    fn test_missing_band_is_an_error() {
        let mut doc = document();
        // Promise a third band in metadata that the module doesn't have
        doc.track.bands.push("2000Hz-20000Hz".to_string());
        assert!(matches!(
            CubeView::build(&doc),
            Err(ViewError::MissingSeries { .. })
        ));
    }
}
