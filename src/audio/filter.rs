//! Biquad coefficients from the Audio EQ Cookbook.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    // passes input through unchanged
    pub fn identity() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }

    pub fn lowpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = omega(cutoff, q, sample_rate);
        Self::normalize(
            (1.0 - cos_w) / 2.0,
            1.0 - cos_w,
            (1.0 - cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        )
    }

    pub fn highpass(cutoff: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = omega(cutoff, q, sample_rate);
        Self::normalize(
            (1.0 + cos_w) / 2.0,
            -(1.0 + cos_w),
            (1.0 + cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        )
    }

    /// Constant 0 dB peak gain band-pass.
    pub fn bandpass(center: f64, q: f64, sample_rate: f64) -> Self {
        let (cos_w, alpha) = omega(center, q, sample_rate);
        Self::normalize(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha)
    }

    fn normalize(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }
}

fn omega(freq: f64, q: f64, sample_rate: f64) -> (f64, f64) {
    // low q values blow up alpha
    let q = q.max(0.5);
    let w = 2.0 * PI * freq / sample_rate;
    (w.cos(), w.sin() / (2.0 * q))
}

#[cfg(test)]
mod tests {
    use super::*;

    // |H(e^jw)| for a normalized biquad
    fn magnitude(c: &BiquadCoeffs, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let (c1, s1) = (w.cos(), -w.sin());
        let (c2, s2) = ((2.0 * w).cos(), -(2.0 * w).sin());
        let num_re = c.b0 + c.b1 * c1 + c.b2 * c2;
        let num_im = c.b1 * s1 + c.b2 * s2;
        let den_re = 1.0 + c.a1 * c1 + c.a2 * c2;
        let den_im = c.a1 * s1 + c.a2 * s2;
        (num_re.hypot(num_im)) / (den_re.hypot(den_im))
    }

    #[test]
    fn bandpass_peaks_at_center() {
        let c = BiquadCoeffs::bandpass(8000.0, 1.0, 48_000.0);
        assert!((magnitude(&c, 8000.0, 48_000.0) - 1.0).abs() < 1e-6);
        assert!(magnitude(&c, 500.0, 48_000.0) < 0.2);
    }

    #[test]
    fn lowpass_and_highpass_cross_at_cutoff() {
        let q = std::f64::consts::FRAC_1_SQRT_2;
        let lp = BiquadCoeffs::lowpass(1000.0, q, 48_000.0);
        let hp = BiquadCoeffs::highpass(1000.0, q, 48_000.0);
        let at_cutoff = std::f64::consts::FRAC_1_SQRT_2;
        assert!((magnitude(&lp, 1000.0, 48_000.0) - at_cutoff).abs() < 1e-3);
        assert!((magnitude(&hp, 1000.0, 48_000.0) - at_cutoff).abs() < 1e-3);
        assert!(magnitude(&lp, 10_000.0, 48_000.0) < 0.05);
        assert!(magnitude(&hp, 100.0, 48_000.0) < 0.05);
    }
}
