//! Window metrics and combined risk for the behavioral stream
//!
//! Implements the fixed scoring formula per non-overlapping window:
//!
//! ```text
//! T = topic switches / (messages - 1)                      topic drift
//! R = clamp(total edits / (messages * 6), 0, 1)            rewrite rate
//! vol = 0.45*T + 0.35*R + 0.20*clamp(pause_jitter/1.2, 0, 1)
//! P = max(0, vol - prev_vol)                               pressure spike
//! S = clamp(0.60*structure + 0.25*(1-T)
//!         + 0.15*clamp(1.2 - pause_mean, 0, 1), 0, 1)      stability
//! C = clamp(contradictions / messages, 0, 1)               contradiction rate
//! F = clamp((1-T) * structure, 0, 1)                       focus
//!
//! risk = clamp(0.30*T + 0.25*R + 0.20*P + 0.15*C + 0.10*(1-S), 0, 1)
//! ```
//!
//! All outputs are pure functions of the input slice; the only cross-window
//! state is the previous volatility, threaded explicitly inside
//! [`compute_windows`].

use crate::config::SignalConfig;
use crate::event::{EventKind, HfsEvent};
use serde::{Deserialize, Serialize};

/// Risk formula weights (fixed convex combination)
const RISK_W_DRIFT: f64 = 0.30;
const RISK_W_REWRITE: f64 = 0.25;
const RISK_W_PRESSURE: f64 = 0.20;
const RISK_W_CONTRADICTION: f64 = 0.15;
const RISK_W_INSTABILITY: f64 = 0.10;

/// Volatility proxy weights
const VOL_W_DRIFT: f64 = 0.45;
const VOL_W_REWRITE: f64 = 0.35;
const VOL_W_JITTER: f64 = 0.20;

/// Edits per message at which the rewrite rate saturates
const REWRITE_CAP_PER_MESSAGE: f64 = 6.0;

/// Derived metrics for one scoring window.
///
/// Field wire names carry the tag letters used by the signature encoder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    /// Topic drift ratio in [0, 1]
    #[serde(rename = "T_topic_drift", default)]
    pub topic_drift: f64,

    /// Rewrite rate in [0, 1]
    #[serde(rename = "R_rewrite", default)]
    pub rewrite: f64,

    /// Positive volatility acceleration in [0, 1]
    #[serde(rename = "P_pressure_spike", default)]
    pub pressure_spike: f64,

    /// Stability in [0, 1]
    #[serde(rename = "S_stability", default)]
    pub stability: f64,

    /// Contradiction rate in [0, 1]
    #[serde(rename = "C_contradiction", default)]
    pub contradiction: f64,

    /// Focus in [0, 1]
    #[serde(rename = "F_focus", default)]
    pub focus: f64,

    /// Combined risk in [0, 1]
    #[serde(default)]
    pub risk: f64,
}

/// Compute metrics over non-overlapping windows.
///
/// The trailing partial window is included when non-empty. `window_size`
/// is validated by [`crate::config::HfsConfig::validate`]; a zero value is
/// treated as 1 here rather than panicking.
pub fn compute_windows(events: &[HfsEvent], cfg: &SignalConfig) -> Vec<WindowMetrics> {
    let size = cfg.window_size.max(1);
    let mut windows = Vec::with_capacity(events.len().div_ceil(size));
    let mut prev_vol: Option<f64> = None;

    for chunk in events.chunks(size) {
        let (metrics, vol) = window_metrics(chunk, prev_vol);
        prev_vol = Some(vol);
        windows.push(metrics);
    }

    windows
}

/// Score a single window against the previous window's volatility.
///
/// Returns the metrics and this window's volatility for threading into the
/// next call.
fn window_metrics(chunk: &[HfsEvent], prev_vol: Option<f64>) -> (WindowMetrics, f64) {
    let mut topics: Vec<&str> = Vec::new();
    let mut rewrites: u64 = 0;
    let mut structure_sum = 0.0;
    let mut structure_count = 0usize;
    let mut contradictions = 0.0;
    let mut pauses: Vec<f64> = Vec::new();

    for ev in chunk {
        match ev.kind {
            EventKind::Message => {
                topics.push(ev.topic.as_str());
                rewrites += u64::from(ev.features.edits);
                structure_sum += ev.features.structure;
                structure_count += 1;
                contradictions += ev.features.contradiction;
                pauses.push(ev.features.pause_s);
            }
            EventKind::Edit => {
                rewrites += u64::from(ev.features.edits);
            }
        }
    }

    let switches = topics
        .windows(2)
        .filter(|pair| !pair[0].is_empty() && !pair[1].is_empty() && pair[0] != pair[1])
        .count();
    let topic_drift = switches as f64 / topics.len().saturating_sub(1).max(1) as f64;

    let rewrite_cap = (topics.len() as f64 * REWRITE_CAP_PER_MESSAGE).max(1.0);
    let rewrite = (rewrites as f64 / rewrite_cap).clamp(0.0, 1.0);

    let pause_mean = pauses.iter().sum::<f64>() / pauses.len().max(1) as f64;
    let pause_jitter = if pauses.is_empty() {
        0.0
    } else {
        let var = pauses
            .iter()
            .map(|p| (p - pause_mean).powi(2))
            .sum::<f64>()
            / pauses.len() as f64;
        var.sqrt()
    };

    let vol = VOL_W_DRIFT * topic_drift
        + VOL_W_REWRITE * rewrite
        + VOL_W_JITTER * (pause_jitter / 1.2).clamp(0.0, 1.0);

    // Pressure spike: positive part of the volatility acceleration
    let pressure_spike = match prev_vol {
        Some(pv) => (vol - pv).clamp(-1.0, 1.0).max(0.0),
        None => 0.0,
    };

    let structure_mean = structure_sum / structure_count.max(1) as f64;

    let stability = (0.60 * structure_mean
        + 0.25 * (1.0 - topic_drift)
        + 0.15 * (1.2 - pause_mean).clamp(0.0, 1.0))
    .clamp(0.0, 1.0);

    let contradiction = (contradictions / topics.len().max(1) as f64).clamp(0.0, 1.0);

    let focus = ((1.0 - topic_drift) * structure_mean).clamp(0.0, 1.0);

    let risk = (RISK_W_DRIFT * topic_drift
        + RISK_W_REWRITE * rewrite
        + RISK_W_PRESSURE * pressure_spike
        + RISK_W_CONTRADICTION * contradiction
        + RISK_W_INSTABILITY * (1.0 - stability))
        .clamp(0.0, 1.0);

    (
        WindowMetrics {
            topic_drift,
            rewrite,
            pressure_spike,
            stability,
            contradiction,
            focus,
            risk,
        },
        vol,
    )
}
