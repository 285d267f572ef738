//! Metric normalization for rendering.
//!
//! Every renderable metric has one entry here mapping raw values onto
//! [0, 1] (unipolar) or [-1, 1] (bipolar). Table order is the canonical
//! metric axis order and drives hue assignment, so entries must not be
//! reordered casually. Curve constants were tuned against real libraries
//! and carry the tuning notes inline.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    Unipolar,
    Bipolar,
}

/// Soft limits: normalized outputs aim for 0.05..0.95 (unipolar) or
/// +-0.95 (bipolar) so the extreme colors stay reserved for off-scale
/// values.
const TARGET_MIN: f64 = 0.05;
const TARGET_MAX: f64 = 0.95;
const TARGET_RANGE: f64 = 0.95;

#[derive(Debug, Clone, Copy)]
enum Curve {
    /// Straight clamp to [0, 1].
    ClampUnipolar,
    /// Straight clamp to [-1, 1].
    ClampBipolar,
    /// Rising logistic: `low` maps near TARGET_MIN, `high` near TARGET_MAX.
    Logistic { low: f64, high: f64 },
    /// Falling logistic: `low` is excellent, `high` is poor.
    LogisticFalling { low: f64, high: f64 },
    /// Rising bipolar logistic centered on `neutral`.
    BipolarLogistic { neutral: f64, low: f64, high: f64 },
    /// Falling bipolar logistic (small is good).
    BipolarLogisticFalling { neutral: f64, low: f64, high: f64 },
    /// Log10 ramp from `min` to `max`, zero at or below `min`.
    LogDecade { min: f64, max: f64 },
    /// Two-segment logistic for quantization dynamic range; keeps the
    /// midpoint exactly at zero.
    SplitDynRange { midpoint: f64 },
    /// Triangular: zero outside [low, high], 1 at `peak`.
    Triangle { low: f64, peak: f64, high: f64 },
    /// Bipolar sweet spot around `center`; outside the spot it falls to
    /// -TARGET_RANGE over `penalty`.
    SweetSpot { center: f64, width: f64, penalty: f64 },
    /// Linear up to `transition`, then an exponential knee toward 1.
    Knee { linear_max: f64, transition: f64 },
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl Curve {
    fn apply(&self, x: f64) -> f64 {
        match *self {
            Curve::ClampUnipolar => x.clamp(0.0, 1.0),
            Curve::ClampBipolar => x.clamp(-1.0, 1.0),
            Curve::Logistic { low, high } => {
                let mid = (low + high) / 2.0;
                let scale = (high - low) / (2.0 * ((1.0 - TARGET_MIN) / TARGET_MIN).ln());
                TARGET_MIN + (TARGET_MAX - TARGET_MIN) * sigmoid((x - mid) / scale)
            }
            Curve::LogisticFalling { low, high } => {
                let mid = (low + high) / 2.0;
                let scale = (high - low) / (2.0 * ((1.0 - TARGET_MIN) / TARGET_MIN).ln());
                TARGET_MAX - (TARGET_MAX - TARGET_MIN) * sigmoid((x - mid) / scale)
            }
            Curve::BipolarLogistic { neutral, low, high } => {
                let scale = (high - low)
                    / (2.0 * ((1.0 + TARGET_RANGE) / (1.0 - TARGET_RANGE)).ln());
                TARGET_RANGE * (2.0 * sigmoid((x - neutral) / scale) - 1.0)
            }
            Curve::BipolarLogisticFalling { neutral, low, high } => {
                let scale = (high - low)
                    / (2.0 * ((1.0 + TARGET_RANGE) / (1.0 - TARGET_RANGE)).ln());
                TARGET_RANGE * (2.0 * sigmoid((neutral - x) / scale) - 1.0)
            }
            Curve::LogDecade { min, max } => {
                if x <= min {
                    0.0
                } else {
                    (TARGET_MAX * (x / min).log10() / (max / min).log10()).min(TARGET_MAX)
                }
            }
            Curve::SplitDynRange { midpoint } => {
                // Scale chosen so the logistic hits 0.05/0.95 fifty dB from
                // the midpoint.
                let scale = 50.0 / 19f64.ln();
                let s = sigmoid((x - midpoint) / scale);
                if x < midpoint {
                    (((s - 0.05) / 0.45) * 0.95 - 0.95).clamp(-TARGET_RANGE, 0.0)
                } else {
                    (((s - 0.5) / 0.45) * 0.95).clamp(0.0, TARGET_RANGE)
                }
            }
            Curve::Triangle { low, peak, high } => {
                if x <= low || x >= high {
                    0.0
                } else if x < peak {
                    (x - low) / (peak - low)
                } else {
                    (high - x) / (high - peak)
                }
            }
            Curve::SweetSpot { center, width, penalty } => {
                let distance = (x - center).abs();
                if distance <= width / 2.0 {
                    TARGET_RANGE * (1.0 - distance / (width / 2.0))
                } else {
                    -TARGET_RANGE * (1f64).min((distance - width / 2.0) / penalty)
                }
            }
            Curve::Knee { linear_max, transition } => {
                if x <= transition {
                    ((x / transition) * linear_max).clamp(0.0, linear_max)
                } else {
                    linear_max
                        + (1.0 - linear_max)
                            * (1.0 - (-2.0 * (x - transition) / transition).exp())
                }
            }
        }
    }
}

/// One renderable metric.
#[derive(Debug, Clone, Copy)]
pub struct MetricSpec {
    /// `module::field` key into the metrics document.
    pub key: &'static str,
    /// Short display title.
    pub title: &'static str,
    pub polarity: Polarity,
    curve: Curve,
}

impl MetricSpec {
    pub fn normalize(&self, raw: f64) -> f64 {
        self.curve.apply(raw)
    }

    pub fn is_bipolar(&self) -> bool {
        self.polarity == Polarity::Bipolar
    }

    /// Lower bound of the normalized range.
    pub fn min_value(&self) -> f64 {
        match self.polarity {
            Polarity::Unipolar => 0.0,
            Polarity::Bipolar => -1.0,
        }
    }
}

use Polarity::{Bipolar, Unipolar};

/// The canonical metric set, in axis order.
pub static METRIC_TABLE: &[MetricSpec] = &[
    MetricSpec {
        key: "audio_quality::avg_sinad_db",
        title: "SINAD",
        polarity: Unipolar,
        // 40 dB is poor, 70 dB is high-end gear
        curve: Curve::Logistic { low: 40.0, high: 70.0 },
    },
    MetricSpec {
        key: "audio_quality::std_sinad_db",
        title: "SINAD.stab",
        polarity: Bipolar,
        // Audible problems start around 8 dB of frame-to-frame spread
        curve: Curve::BipolarLogisticFalling { neutral: 8.0, low: 0.0, high: 16.0 },
    },
    MetricSpec {
        key: "audio_quality::spectral_flatness_ratio",
        title: "ovrl.mus",
        polarity: Bipolar,
        // Musical content clusters around 0.3-0.5 flatness
        curve: Curve::SweetSpot { center: 0.4, width: 0.2, penalty: 0.6 },
    },
    MetricSpec {
        key: "stereo_width::presence",
        title: "st.presence",
        polarity: Unipolar,
        curve: Curve::ClampUnipolar,
    },
    MetricSpec {
        key: "stereo_width::quality",
        title: "st.natrl",
        polarity: Bipolar,
        curve: Curve::ClampBipolar,
    },
    MetricSpec {
        key: "stereo_correlation::correlation",
        title: "st.corr",
        polarity: Bipolar,
        curve: Curve::ClampBipolar,
    },
    MetricSpec {
        key: "stereo_phase::coherence",
        title: "st.phase",
        polarity: Unipolar,
        curve: Curve::ClampUnipolar,
    },
    MetricSpec {
        key: "quantization::avg_noise_floor_db",
        title: "noise Q",
        polarity: Unipolar,
        curve: Curve::LogisticFalling { low: -200.0, high: -20.0 },
    },
    MetricSpec {
        key: "quantization::noise_floor_std_db",
        title: "noise st.",
        polarity: Unipolar,
        curve: Curve::LogisticFalling { low: 0.0, high: 20.0 },
    },
    MetricSpec {
        key: "quantization::dynamic_range_db",
        title: "dyn.rng",
        polarity: Bipolar,
        // Midpoint tracks mid-band performance of clean material; adjust
        // when the multiband cutoffs change
        curve: Curve::SplitDynRange { midpoint: 110.0 },
    },
    MetricSpec {
        key: "dynamic_range::overall_avg_crest_factor_db",
        title: "ovrl.dyn",
        polarity: Bipolar,
        // Below 8 dB reads as problematic compression
        curve: Curve::BipolarLogistic { neutral: 8.0, low: 3.0, high: 16.0 },
    },
    MetricSpec {
        key: "dynamics::crest_factor_db",
        title: "dynamics",
        polarity: Unipolar,
        curve: Curve::Logistic { low: 3.0, high: 20.0 },
    },
    MetricSpec {
        key: "dynamics::avg_crest_factor_db",
        title: "avg.dyn",
        polarity: Unipolar,
        curve: Curve::Logistic { low: 3.0, high: 16.0 },
    },
    MetricSpec {
        key: "freq_response::avg_magnitude_db",
        title: "rel.lvl",
        polarity: Bipolar,
        curve: Curve::BipolarLogistic { neutral: -3.0, low: -30.0, high: 10.0 },
    },
    MetricSpec {
        key: "quantization::estimated_bits",
        title: "bit depth",
        polarity: Unipolar,
        curve: Curve::Logistic { low: 6.0, high: 24.0 },
    },
    MetricSpec {
        key: "quantization::unique_levels",
        title: "digit.res",
        polarity: Unipolar,
        curve: Curve::LogDecade { min: 100.0, max: 100_000.0 },
    },
    MetricSpec {
        key: "audio_quality::quantization_efficiency",
        title: "dither.effy",
        polarity: Unipolar,
        // 0.575 is clean dithered processing; near 1.0 is suspicious
        curve: Curve::Triangle { low: 0.25, peak: 0.575, high: 0.85 },
    },
    MetricSpec {
        key: "quantization::avg_spectral_slope_db",
        title: "dither Q",
        polarity: Bipolar,
        curve: Curve::BipolarLogistic { neutral: -5.0, low: -20.0, high: 10.0 },
    },
    MetricSpec {
        key: "quantization::spectral_slope_std_db",
        title: "dither st.",
        polarity: Unipolar,
        curve: Curve::LogisticFalling { low: 0.0, high: 15.0 },
    },
    MetricSpec {
        key: "sparkle::sparkle",
        title: "sparkle",
        polarity: Unipolar,
        curve: Curve::Knee { linear_max: 0.95, transition: 0.3 },
    },
];

/// Look up a metric's normalization entry by `module::field` key.
pub fn lookup(key: &str) -> Option<&'static MetricSpec> {
    METRIC_TABLE.iter().find(|m| m.key == key)
}

/// Position of a metric in the canonical order (drives hue assignment).
pub fn metric_index(key: &str) -> Option<usize> {
    METRIC_TABLE.iter().position(|m| m.key == key)
}
