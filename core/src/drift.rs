//! One-sided CUSUM drift alarm over the risk series
//!
//! Detects a sustained upward shift of risk away from the series mean:
//!
//! ```text
//! s_0 = 0
//! s_i = max(0, s_{i-1} + (x_i - mean - k))
//! alarm when s_i > h at any point
//! ```
//!
//! The zero floor makes the test one-sided: downward excursions reset the
//! accumulator instead of banking credit. `k` absorbs ordinary noise; `h`
//! sets how much sustained excess is tolerated before the alarm fires.

use crate::config::SignalConfig;

/// Result of a CUSUM evaluation over one risk series
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DriftOutcome {
    /// Whether the accumulator exceeded the alarm threshold at any step
    pub fired: bool,
    /// Highest accumulator value reached
    pub peak: f64,
    /// Accumulator value after the last step
    pub final_sum: f64,
}

/// Run the one-sided CUSUM test over a risk series.
///
/// Series shorter than `cfg.cusum_min_points` yield a quiet outcome; the
/// test has no meaning on a handful of points.
pub fn cusum_drift(series: &[f64], cfg: &SignalConfig) -> DriftOutcome {
    if series.len() < cfg.cusum_min_points {
        return DriftOutcome::default();
    }

    let mean = series.iter().sum::<f64>() / series.len() as f64;

    let mut sum = 0.0;
    let mut peak = 0.0;
    let mut fired = false;
    for &x in series {
        sum = (sum + (x - mean - cfg.cusum_k)).max(0.0);
        if sum > peak {
            peak = sum;
        }
        if sum > cfg.cusum_h {
            fired = true;
        }
    }

    DriftOutcome {
        fired,
        peak,
        final_sum: sum,
    }
}
