//! Frequency band plan shared by all band-aware analysis modules.
//!
//! Bands are logarithmically spaced between the configured cutoff
//! frequencies. The label format ("20Hz-65Hz") doubles as the band key in
//! the metrics document, so it must stay stable across versions.

/// Synthetic band label used by modules that analyze the unfiltered signal.
pub const FULL_SPECTRUM: &str = "full";

/// One frequency partition of the band plan.
#[derive(Debug, Clone, PartialEq)]
pub struct BandRange {
    pub low_hz: f64,
    pub high_hz: f64,
    pub label: String,
}

/// The ordered set of frequency bands for one run.
/// All band-aware modules share the same plan; order defines the band axis.
#[derive(Debug, Clone)]
pub struct BandPlan {
    ranges: Vec<BandRange>,
}

impl BandPlan {
    /// Build `count` log-spaced bands between `low_hz` and `high_hz`.
    pub fn new(low_hz: f64, high_hz: f64, count: usize) -> Self {
        let edges = log_edges(low_hz, high_hz, count);
        let ranges = (0..count)
            .map(|i| {
                let low = edges[i];
                let high = edges[i + 1];
                BandRange {
                    low_hz: low,
                    high_hz: high,
                    label: band_label(low, high),
                }
            })
            .collect();
        Self { ranges }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[BandRange] {
        &self.ranges
    }

    /// Band labels in axis order.
    pub fn labels(&self) -> Vec<String> {
        self.ranges.iter().map(|r| r.label.clone()).collect()
    }

    /// Total octaves spanned by the plan (used for sparkle compensation).
    pub fn total_octaves(&self) -> f64 {
        match (self.ranges.first(), self.ranges.last()) {
            (Some(first), Some(last)) => (last.high_hz / first.low_hz).log2(),
            _ => 0.0,
        }
    }
}

/// Logarithmically spaced band edges, `count + 1` values.
pub fn log_edges(low_hz: f64, high_hz: f64, count: usize) -> Vec<f64> {
    let log_lo = low_hz.log10();
    let log_hi = high_hz.log10();
    (0..=count)
        .map(|i| 10f64.powf(log_lo + (log_hi - log_lo) * i as f64 / count as f64))
        .collect()
}

/// Band key format. Frequencies are truncated to integer Hz, matching the
/// keys already present in documents written by earlier versions.
pub fn band_label(low_hz: f64, high_hz: f64) -> String {
    format!("{}Hz-{}Hz", low_hz as u64, high_hz as u64)
}
