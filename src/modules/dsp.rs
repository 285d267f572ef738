//! Shared signal-processing primitives for the analysis modules.

use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// RMS level in dBFS. `None` for silence.
pub fn rms_dbfs(signal: &[f64]) -> Option<f64> {
    if signal.is_empty() {
        return None;
    }
    let mean_sq = signal.iter().map(|s| s * s).sum::<f64>() / signal.len() as f64;
    let rms = mean_sq.sqrt();
    if rms == 0.0 {
        None
    } else {
        Some(20.0 * rms.log10())
    }
}

/// Peak level in dBFS. `None` for silence.
pub fn peak_dbfs(signal: &[f64]) -> Option<f64> {
    let peak = signal.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    if peak == 0.0 {
        None
    } else {
        Some(20.0 * peak.log10())
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Linear-interpolated percentile over a copy of the data, `p` in [0, 100].
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}

/// Round to a fixed number of decimal places. Stored metrics are rounded
/// so re-serialized documents stay compact and stable.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Hann window of length `n`.
pub fn hann(n: usize) -> Vec<f64> {
    if n <= 1 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            let x = std::f64::consts::PI * i as f64 / (n - 1) as f64;
            0.5 - 0.5 * (2.0 * x).cos()
        })
        .collect()
}

/// Windowed FFT front-end shared by the spectral modules. One instance per
/// (module, chunk) so the plan and window are built once.
pub struct FftAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    window: Vec<f64>,
    size: usize,
}

impl FftAnalyzer {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(size),
            window: hann(size),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn transform(&self, frame: &[f64]) -> Vec<Complex<f64>> {
        debug_assert_eq!(frame.len(), self.size);
        let mut buf: Vec<Complex<f64>> = frame
            .iter()
            .zip(&self.window)
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut buf);
        buf
    }

    /// Windowed complex spectrum, all `size` bins.
    pub fn spectrum(&self, frame: &[f64]) -> Vec<Complex<f64>> {
        self.transform(frame)
    }

    /// Magnitudes of the one-sided spectrum, `size / 2 + 1` bins.
    pub fn magnitudes(&self, frame: &[f64]) -> Vec<f64> {
        let buf = self.transform(frame);
        buf[..self.size / 2 + 1].iter().map(|c| c.norm()).collect()
    }

    /// Magnitudes of the full two-sided spectrum, `size` bins.
    pub fn full_magnitudes(&self, frame: &[f64]) -> Vec<f64> {
        self.transform(frame).iter().map(|c| c.norm()).collect()
    }

    /// Center frequency of one-sided bin `i` at the given sample rate.
    pub fn bin_frequency(&self, i: usize, sample_rate: f64) -> f64 {
        i as f64 * sample_rate / self.size as f64
    }
}

/// Direct-form-I biquad with RBJ Butterworth coefficients (Q = 1/sqrt(2)).
#[derive(Debug, Clone)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

    fn lowpass(cutoff_hz: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * Self::BUTTERWORTH_Q);
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos_w0) / 2.0 / a0,
            b1: (1.0 - cos_w0) / a0,
            b2: (1.0 - cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn highpass(cutoff_hz: f64, sample_rate: f64) -> Self {
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sample_rate;
        let alpha = w0.sin() / (2.0 * Self::BUTTERWORTH_Q);
        let cos_w0 = w0.cos();
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 + cos_w0) / 2.0 / a0,
            b1: -(1.0 + cos_w0) / a0,
            b2: (1.0 + cos_w0) / 2.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    fn step(&mut self, x: f64) -> f64 {
        let y = self.b0 * x + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y
    }

    fn run(&mut self, signal: &[f64]) -> Vec<f64> {
        signal.iter().map(|&x| self.step(x)).collect()
    }
}

/// Butterworth bandpass: highpass at `low_hz` cascaded with lowpass at
/// `high_hz`. Edges at or beyond the representable range are skipped, so a
/// band touching Nyquist degrades to a pure highpass.
pub fn bandpass(signal: &[f64], sample_rate: f64, low_hz: f64, high_hz: f64) -> Vec<f64> {
    let nyquist = sample_rate / 2.0;
    let mut out;

    if low_hz > 0.0 && low_hz < nyquist {
        out = Biquad::highpass(low_hz, sample_rate).run(signal);
    } else {
        out = signal.to_vec();
    }

    if high_hz < nyquist {
        out = Biquad::lowpass(high_hz, sample_rate).run(&out);
    }

    out
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
    fn test_rms_of_full_scale_square_is_zero_dbfs() {
        let signal = vec![1.0, -1.0, 1.0, -1.0];
        assert!(rms_dbfs(&signal).unwrap().abs() < 1e-9);
        assert!(peak_dbfs(&signal).unwrap().abs() < 1e-9);
    }

    #[test]
    fn test_silence_has_no_level() {
        assert_eq!(rms_dbfs(&[0.0; 16]), None);
        assert_eq!(peak_dbfs(&[0.0; 16]), None);
        assert_eq!(rms_dbfs(&[]), None);
    }

    #[test]
    fn test_sine_rms_is_minus_3_dbfs() {
        let signal = sine(100.0, 48000.0, 48000);
        let db = rms_dbfs(&signal).unwrap();
        assert!((db - (-3.0103)).abs() < 0.01, "got {db}");
    }

    #[test]
    fn test_percentile() {
        let v = vec![1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 100.0), Some(4.0));
        assert_eq!(percentile(&v, 50.0), Some(2.5));
        assert_eq!(percentile(&[], 50.0), None);
    }

    #[test]
    fn test_std_dev() {
        let v = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((std_dev(&v).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(std_dev(&[]), None);
    }

    #[test]
    fn test_hann_window_shape() {
        let w = hann(8);
        assert!(w[0].abs() < 1e-12);
        assert!(w[7].abs() < 1e-12);
        let peak = w.iter().cloned().fold(0.0f64, f64::max);
        assert!((peak - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_fft_peak_lands_on_sine_bin() {
        let rate = 1024.0;
        let analyzer = FftAnalyzer::new(1024);
        // Bin 64 exactly
        let signal = sine(64.0, rate, 1024);
        let mags = analyzer.magnitudes(&signal);
        let peak_bin = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_bin, 64);
        assert!((analyzer.bin_frequency(peak_bin, rate) - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_bandpass_attenuates_out_of_band() {
        let rate = 48000.0;
        let in_band = sine(1000.0, rate, 48000);
        let below = sine(30.0, rate, 48000);
        let above = sine(15000.0, rate, 48000);

        let kept = rms_dbfs(&bandpass(&in_band, rate, 500.0, 2000.0)).unwrap();
        let cut_low = rms_dbfs(&bandpass(&below, rate, 500.0, 2000.0)).unwrap();
        let cut_high = rms_dbfs(&bandpass(&above, rate, 500.0, 2000.0)).unwrap();

        assert!(kept > cut_low + 20.0, "kept {kept}, low {cut_low}");
        assert!(kept > cut_high + 20.0, "kept {kept}, high {cut_high}");
    }

    #[test]
    fn test_bandpass_with_edge_at_nyquist_skips_lowpass() {
        let rate = 44100.0;
        let signal = sine(18000.0, rate, 8192);
        // High edge above Nyquist: band acts as a highpass only
        let out = bandpass(&signal, rate, 13000.0, 22050.0);
        let kept = rms_dbfs(&out).unwrap();
        let input = rms_dbfs(&signal).unwrap();
        assert!((kept - input).abs() < 3.0);
    }
}
