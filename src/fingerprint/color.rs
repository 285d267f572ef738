//! Metric coloring in LCH space.
//!
//! Each metric gets a hue from the 180-360 degree half of the wheel by
//! its position in the canonical order. Unipolar values ramp chroma and
//! lightness with the value; bipolar values blend the metric hue against
//! its complement, dark at zero and vivid at the extremes.

pub type Rgb = [u8; 3];

/// Hue (degrees) assigned to a metric by canonical index.
pub fn metric_hue(metric_index: usize, metric_count: usize) -> f64 {
    180.0 + (metric_index as f64 / metric_count.max(1) as f64) * 180.0
}

/// Color for one normalized data point.
pub fn datapoint_color(
    metric_index: usize,
    normalized: f64,
    bipolar: bool,
    metric_count: usize,
) -> Rgb {
    let primary_hue = metric_hue(metric_index, metric_count);

    if bipolar {
        let complementary_hue = (primary_hue + 180.0) % 360.0;

        // Blend ratio from [-1, 1]; lightness 25% at zero up to 50% at
        // either extreme.
        let primary_ratio = (normalized + 1.0) / 2.0;
        let lightness = 25.0 + normalized.abs() * 25.0;
        let chroma = 100.0;

        let primary = lch_to_rgb(lightness, chroma, primary_hue);
        let complementary = lch_to_rgb(lightness, chroma, complementary_hue);

        let mut out = [0u8; 3];
        for i in 0..3 {
            let blended = primary[i] as f64 * primary_ratio
                + complementary[i] as f64 * (1.0 - primary_ratio);
            out[i] = blended.round() as u8;
        }
        out
    } else {
        let lightness = 25.0 + normalized * 25.0;
        let chroma = normalized * 100.0;
        lch_to_rgb(lightness, chroma, primary_hue)
    }
}

/// CIE LCh(ab) to sRGB with a D65 white point, channels clamped into
/// gamut.
pub fn lch_to_rgb(l: f64, c: f64, h_deg: f64) -> Rgb {
    let h_rad = h_deg.to_radians();
    let a = c * h_rad.cos();
    let b = c * h_rad.sin();

    // Lab -> XYZ
    let fy = (l + 16.0) / 116.0;
    let fx = fy + a / 500.0;
    let fz = fy - b / 200.0;

    let finv = |t: f64| {
        let t3 = t * t * t;
        if t3 > 0.008856 {
            t3
        } else {
            (t - 16.0 / 116.0) / 7.787
        }
    };

    // D65 reference white
    let x = 0.95047 * finv(fx);
    let y = 1.00000 * finv(fy);
    let z = 1.08883 * finv(fz);

    // XYZ -> linear sRGB
    let r_lin = 3.2406 * x - 1.5372 * y - 0.4986 * z;
    let g_lin = -0.9689 * x + 1.8758 * y + 0.0415 * z;
    let b_lin = 0.0557 * x - 0.2040 * y + 1.0570 * z;

    let gamma = |u: f64| {
        let u = u.clamp(0.0, 1.0);
        if u <= 0.0031308 {
            12.92 * u
        } else {
            1.055 * u.powf(1.0 / 2.4) - 0.055
        }
    };

    [
        (gamma(r_lin) * 255.0).round() as u8,
        (gamma(g_lin) * 255.0).round() as u8,
        (gamma(b_lin) * 255.0).round() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lch_grayscale_axis() {
        // Zero chroma is a gray regardless of hue
        let g1 = lch_to_rgb(50.0, 0.0, 0.0);
        let g2 = lch_to_rgb(50.0, 0.0, 200.0);
        assert_eq!(g1, g2);
        assert!(g1[0].abs_diff(g1[1]) <= 1);
        assert!(g1[1].abs_diff(g1[2]) <= 1);
    }

    #[test]
    fn test_lch_lightness_ordering() {
        let dark = lch_to_rgb(10.0, 0.0, 0.0);
        let light = lch_to_rgb(90.0, 0.0, 0.0);
        assert!(light[0] > dark[0]);
    }

    #[test]
    fn test_metric_hues_spread_over_half_wheel() {
        let n = 20;
        let first = metric_hue(0, n);
        let last = metric_hue(n - 1, n);
        assert_eq!(first, 180.0);
        assert!(last < 360.0);
        assert!(last > 340.0);
    }

    #[test]
    fn test_unipolar_zero_is_dark() {
        let c = datapoint_color(0, 0.0, false, 20);
        // L=25, C=0: a dark gray
        assert!(c.iter().all(|&ch| ch < 80));
        let max = *c.iter().max().unwrap();
        let min = *c.iter().min().unwrap();
        assert!(max - min <= 2);
    }

    #[test]
    fn test_unipolar_ramp_gets_more_saturated() {
        let low = datapoint_color(0, 0.2, false, 20);
        let high = datapoint_color(0, 1.0, false, 20);
        let spread = |c: Rgb| {
            *c.iter().max().unwrap() as i32 - *c.iter().min().unwrap() as i32
        };
        assert!(spread(high) > spread(low));
    }

    #[test]
    fn test_bipolar_extremes_differ() {
        let neg = datapoint_color(0, -1.0, true, 20);
        let pos = datapoint_color(0, 1.0, true, 20);
        assert_ne!(neg, pos);
    }

    #[test]
    fn test_color_is_deterministic() {
        let a = datapoint_color(7, 0.42, true, 20);
        let b = datapoint_color(7, 0.42, true, 20);
        assert_eq!(a, b);
    }
}
