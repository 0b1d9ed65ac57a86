//! Adaptive baseline and verdict classification
//!
//! Each run recomputes its own baseline from the warm-up prefix of its own
//! risk series; nothing persists between calls. Cross-run memory lives in
//! the store/meta layer and arrives here only as the explicit `shrink`
//! multiplier on the thresholds.

use crate::config::NavigatorConfig;
use crate::errors::HfsError;
use serde::{Deserialize, Serialize};

/// Terminal outcome of a scoring run
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Proceed; risk within the adaptive baseline
    #[default]
    #[serde(alias = "allow")]
    Allow,
    /// Elevated risk, or the drift alarm fired on an otherwise clean run
    #[serde(alias = "warn")]
    Warn,
    /// Risk beyond the block threshold
    #[serde(alias = "block")]
    Block,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Warn => "WARN",
            Self::Block => "BLOCK",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verdict {
    type Err = HfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(Self::Allow),
            "WARN" => Ok(Self::Warn),
            "BLOCK" => Ok(Self::Block),
            other => Err(HfsError::report(format!("unknown verdict: {other}"))),
        }
    }
}

/// Baseline computed from the warm-up prefix of one run's risk series.
///
/// Thresholds are stored post-shrink, i.e. as actually applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// Warm-up mean
    #[serde(default)]
    pub mu: f64,
    /// Warm-up standard deviation (sample variance)
    #[serde(default)]
    pub sigma: f64,
    /// WARN above this risk
    #[serde(default)]
    pub warn_threshold: f64,
    /// BLOCK above this risk
    #[serde(default)]
    pub block_threshold: f64,
    /// Final risk value of the series
    #[serde(default)]
    pub last_risk: f64,
}

/// Outcome of one navigator evaluation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub baseline: Baseline,
    /// Whether the drift alarm forced ALLOW up to WARN
    pub alarm_escalated: bool,
}

/// Classify the last risk value against the warm-up baseline.
///
/// The warm-up prefix is `max(2, floor(warmup_fraction * n))` points.
/// `shrink` (from the meta-controller, 1.0 when absent) multiplies the
/// warn/block thresholds only — never μ, σ, or the risk itself. A series
/// still warming (fewer than 2 points) yields ALLOW with a zero baseline.
/// The drift alarm can only escalate ALLOW to WARN, never de-escalate or
/// force BLOCK.
pub fn evaluate(
    risks: &[f64],
    alarm_fired: bool,
    shrink: f64,
    cfg: &NavigatorConfig,
) -> Decision {
    let n = risks.len();
    if n < 2 {
        return Decision {
            verdict: Verdict::Allow,
            baseline: Baseline::default(),
            alarm_escalated: false,
        };
    }

    let warm = ((cfg.warmup_fraction * n as f64) as usize).max(2).min(n);
    let (mu, sigma) = mean_std(&risks[..warm]);

    let warn_threshold = (mu + cfg.warn_sigma * sigma) * shrink;
    let block_threshold = (mu + cfg.block_sigma * sigma) * shrink;

    let last_risk = risks[n - 1];
    let mut verdict = if last_risk > block_threshold {
        Verdict::Block
    } else if last_risk > warn_threshold {
        Verdict::Warn
    } else {
        Verdict::Allow
    };

    let mut alarm_escalated = false;
    if alarm_fired && verdict == Verdict::Allow {
        verdict = Verdict::Warn;
        alarm_escalated = true;
    }

    Decision {
        verdict,
        baseline: Baseline {
            mu,
            sigma,
            warn_threshold,
            block_threshold,
            last_risk,
        },
        alarm_escalated,
    }
}

/// Mean and sample standard deviation (n-1 denominator)
fn mean_std(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
        / xs.len().saturating_sub(1).max(1) as f64;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NavigatorConfig {
        NavigatorConfig::default()
    }

    /// Warm prefix alternates 0.2/0.25; mu=0.225, sigma≈0.0274,
    /// warn≈0.280, block≈0.307.
    fn jittery_series(last: f64) -> Vec<f64> {
        let mut risks: Vec<f64> = (0..9)
            .map(|i| if i % 2 == 0 { 0.2 } else { 0.25 })
            .collect();
        risks.push(last);
        risks
    }

    #[test]
    fn test_empty_series_allows_with_zero_baseline() {
        let d = evaluate(&[], false, 1.0, &config());
        assert_eq!(d.verdict, Verdict::Allow);
        assert_eq!(d.baseline, Baseline::default());
    }

    #[test]
    fn test_single_point_allows_with_zero_baseline() {
        let d = evaluate(&[0.95], false, 1.0, &config());
        assert_eq!(d.verdict, Verdict::Allow);
        assert_eq!(d.baseline, Baseline::default());
    }

    #[test]
    fn test_constant_series_allows() {
        let d = evaluate(&[0.3; 12], false, 1.0, &config());
        assert_eq!(d.verdict, Verdict::Allow);
        assert_eq!(d.baseline.mu, 0.3);
        assert_eq!(d.baseline.sigma, 0.0);
    }

    #[test]
    fn test_spike_blocks() {
        let d = evaluate(&jittery_series(0.9), false, 1.0, &config());
        assert_eq!(d.verdict, Verdict::Block);
        assert!(d.baseline.block_threshold < 0.9);
    }

    #[test]
    fn test_between_thresholds_warns() {
        let d = evaluate(&jittery_series(0.29), false, 1.0, &config());
        assert_eq!(d.verdict, Verdict::Warn);
        assert!(!d.alarm_escalated);
    }

    #[test]
    fn test_alarm_escalates_allow_to_warn() {
        let d = evaluate(&jittery_series(0.22), true, 1.0, &config());
        assert_eq!(d.verdict, Verdict::Warn);
        assert!(d.alarm_escalated);
    }

    #[test]
    fn test_alarm_never_escalates_warn_to_block() {
        let d = evaluate(&jittery_series(0.29), true, 1.0, &config());
        assert_eq!(d.verdict, Verdict::Warn);
        assert!(!d.alarm_escalated);
    }

    #[test]
    fn test_shrink_lowers_thresholds() {
        let calm = evaluate(&jittery_series(0.19), false, 1.0, &config());
        assert_eq!(calm.verdict, Verdict::Allow);

        let tightened = evaluate(&jittery_series(0.19), false, 0.65, &config());
        assert_eq!(tightened.verdict, Verdict::Warn);
        assert!(tightened.baseline.warn_threshold < calm.baseline.warn_threshold);
        // mu and sigma are untouched by shrink
        assert_eq!(tightened.baseline.mu, calm.baseline.mu);
        assert_eq!(tightened.baseline.sigma, calm.baseline.sigma);
    }

    #[test]
    fn test_baseline_ignores_tail_beyond_warmup() {
        // 10 points: warm prefix is the first 6; the wild tail must not
        // contaminate mu.
        let risks = [0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.9, 0.9, 0.9, 0.2];
        let d = evaluate(&risks, false, 1.0, &config());
        assert!((d.baseline.mu - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_verdict_serde_wire_form() {
        assert_eq!(
            serde_json::to_string(&Verdict::Block).expect("serialize"),
            "\"BLOCK\""
        );
        let v: Verdict = serde_json::from_str("\"WARN\"").expect("deserialize");
        assert_eq!(v, Verdict::Warn);
    }

    #[test]
    fn test_verdict_from_str_case_insensitive() {
        assert_eq!("allow".parse::<Verdict>().expect("parse"), Verdict::Allow);
        assert!("MAYBE".parse::<Verdict>().is_err());
    }
}
