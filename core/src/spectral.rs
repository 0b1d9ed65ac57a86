//! Spectral instability over the risk series
//!
//! Normalized Shannon entropy of the power spectrum of the trailing risk
//! values. A flat, noise-like spectrum approaches 1.0 (energy smeared over
//! all frequencies, no dominant rhythm); a single dominant oscillation
//! approaches 0.0. The DC component is excluded so a constant offset
//! carries no information.
//!
//! The tail is short (≤32 points), so a direct O(n²) DFT is used; no FFT
//! dependency is warranted at this size.

use crate::config::SignalConfig;

/// Power below which the spectrum is treated as empty
const MIN_TOTAL_POWER: f64 = 1e-12;

/// Normalized spectral entropy of the trailing risk values, in [0, 1].
///
/// Returns 0.0 when fewer than `cfg.spectral_min_points` values are
/// available or total spectral power is near zero.
pub fn spectral_entropy(series: &[f64], cfg: &SignalConfig) -> f64 {
    if series.len() < cfg.spectral_min_points.max(2) {
        return 0.0;
    }

    let tail_len = series.len().min(cfg.spectral_tail.max(2));
    let tail = &series[series.len() - tail_len..];
    let n = tail.len();

    // Positive frequencies only: k = 1 ..= n/2
    let bins = n / 2;
    if bins < 2 {
        return 0.0;
    }

    let mut power = vec![0.0; bins];
    let mut total = 0.0;
    for (bin, p) in power.iter_mut().enumerate() {
        let k = bin + 1;
        let mut re = 0.0;
        let mut im = 0.0;
        for (t, &x) in tail.iter().enumerate() {
            let angle = -std::f64::consts::TAU * (k * t) as f64 / n as f64;
            re += x * angle.cos();
            im += x * angle.sin();
        }
        *p = re * re + im * im;
        total += *p;
    }

    if total < MIN_TOTAL_POWER {
        return 0.0;
    }

    let mut entropy = 0.0;
    for p in &power {
        let prob = p / total;
        if prob > 0.0 {
            entropy -= prob * prob.ln();
        }
    }

    (entropy / (bins as f64).ln()).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SignalConfig {
        SignalConfig::default()
    }

    #[test]
    fn test_short_series_is_zero() {
        let series = vec![0.1, 0.9, 0.1, 0.9, 0.1, 0.9, 0.1];
        assert_eq!(spectral_entropy(&series, &config()), 0.0);
    }

    #[test]
    fn test_constant_series_is_zero() {
        // All energy sits at DC, which is excluded.
        let series = vec![0.42; 32];
        assert_eq!(spectral_entropy(&series, &config()), 0.0);
    }

    #[test]
    fn test_pure_oscillation_has_low_entropy() {
        // Four full cycles in 32 samples: all power in one bin.
        let series: Vec<f64> = (0..32)
            .map(|t| 0.5 + 0.4 * (std::f64::consts::TAU * 4.0 * t as f64 / 32.0).sin())
            .collect();
        let h = spectral_entropy(&series, &config());
        assert!(h < 0.05, "entropy was {h}");
    }

    #[test]
    fn test_alternation_has_low_entropy() {
        // +/- alternation concentrates power at the Nyquist bin.
        let series: Vec<f64> = (0..32).map(|t| if t % 2 == 0 { 0.9 } else { 0.1 }).collect();
        let h = spectral_entropy(&series, &config());
        assert!(h < 0.05, "entropy was {h}");
    }

    #[test]
    fn test_noise_has_high_entropy() {
        // Deterministic pseudo-noise via an LCG.
        let mut state: u64 = 0x2545F491;
        let series: Vec<f64> = (0..32)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                (state >> 33) as f64 / (1u64 << 31) as f64
            })
            .collect();
        let h = spectral_entropy(&series, &config());
        assert!(h > 0.5, "entropy was {h}");
    }

    #[test]
    fn test_only_trailing_tail_matters() {
        let tail: Vec<f64> = (0..32)
            .map(|t| 0.5 + 0.3 * (std::f64::consts::TAU * 3.0 * t as f64 / 32.0).sin())
            .collect();
        let mut long = vec![0.77; 40];
        long.extend_from_slice(&tail);

        let a = spectral_entropy(&tail, &config());
        let b = spectral_entropy(&long, &config());
        assert!((a - b).abs() < 1e-12);
    }

    #[test]
    fn test_result_in_unit_interval() {
        let series: Vec<f64> = (0..32).map(|t| ((t * 7 + 3) % 11) as f64 / 11.0).collect();
        let h = spectral_entropy(&series, &config());
        assert!((0.0..=1.0).contains(&h));
    }
}
