//! Navigator report: the wire record between the scoring pipeline and the
//! memory layer.
//!
//! Reports arrive from more than one producer generation, so parsing is
//! deliberately tolerant: metrics may live under `metrics` or
//! `metrics_last_window`, risk under `risk` or `last_risk` (falling back to
//! the baseline's last risk, then a legacy top-level `risk`), instability
//! under `specH` or `spectral_entropy`. The [`SignalSource`] trait is the
//! typed boundary the atom builder consumes, so those fallbacks live here
//! and nowhere else. A report without a verdict is rejected outright.

use crate::errors::{HfsError, Result};
use crate::navigator::Baseline;
use crate::navigator::Verdict;
use serde::{Deserialize, Serialize};

/// Kind emitted by this pipeline's own reports
pub const REPORT_KIND: &str = "HFS_NAVIGATOR_REPORT";
/// Version emitted by this pipeline's own reports
pub const REPORT_VERSION: &str = "0.1";

/// One (risk, specH) sample of the trailing trajectory cycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowerPoint {
    #[serde(default)]
    pub risk: f64,
    #[serde(rename = "specH", alias = "spectral_entropy", default)]
    pub spec_h: f64,
}

/// Metrics block of a report. Every field is optional on the wire; the
/// unified accessors on [`SignalSource`] resolve the fallbacks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMetrics {
    #[serde(
        rename = "T_topic_drift",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub topic_drift: Option<f64>,

    #[serde(rename = "R_rewrite", default, skip_serializing_if = "Option::is_none")]
    pub rewrite: Option<f64>,

    #[serde(
        rename = "P_pressure_spike",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub pressure_spike: Option<f64>,

    #[serde(
        rename = "S_stability",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub stability: Option<f64>,

    #[serde(
        rename = "C_contradiction",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub contradiction: Option<f64>,

    #[serde(rename = "F_focus", default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<f64>,

    /// Legacy name some producers use instead of `risk`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_risk: Option<f64>,

    #[serde(
        rename = "specH",
        alias = "spectral_entropy",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub spec_h: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cusum: Option<f64>,
}

/// Producer bookkeeping and meta-controller annotations. One bag on the
/// wire (`meta`), all fields optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub windows: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,

    /// Threshold shrink factor applied by the meta-controller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shrink: Option<f64>,

    /// Historical observations (strength-weighted) behind the shrink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<f64>,

    /// Store the meta-controller consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
}

/// Parsed navigator report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigatorReport {
    #[serde(default = "default_report_kind")]
    pub kind: String,

    #[serde(default = "default_report_version")]
    pub version: String,

    pub verdict: Verdict,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dna: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ReportMetrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_last_window: Option<ReportMetrics>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<Baseline>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flower_cycle: Option<Vec<FlowerPoint>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ReportMeta>,

    /// Legacy top-level risk, last resort of the risk fallback chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<f64>,
}

fn default_report_kind() -> String {
    "NAVIGATOR_REPORT".to_string()
}

fn default_report_version() -> String {
    "0.2".to_string()
}

impl NavigatorReport {
    /// Parse a report from JSON text
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| HfsError::report_with_source("failed to parse navigator report", e))
    }

    /// Parse a report from an already-decoded JSON value
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| HfsError::report_with_source("failed to parse navigator report", e))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| HfsError::report_with_source("failed to serialize navigator report", e))
    }

    fn metrics_view(&self) -> Option<&ReportMetrics> {
        self.metrics.as_ref().or(self.metrics_last_window.as_ref())
    }
}

/// Fixed per-verdict guidance line included in emitted reports
pub fn recommendation_for(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Block => "Stop. Reduce drift: pick 1 goal, write 3 steps, then continue.",
        Verdict::Warn => "Slow down. Keep 1 topic for the next 10 minutes. Convert to steps.",
        Verdict::Allow => "Proceed. Next: turn the plan into 3 concrete tasks.",
    }
}

/// Capability view of a report: everything the atom builder needs, with
/// the multi-producer fallbacks already resolved. Implemented by
/// [`NavigatorReport`]; other producer adapters implement the same trait
/// instead of the builder probing raw JSON.
pub trait SignalSource {
    fn kind(&self) -> &str;
    fn version(&self) -> &str;
    fn verdict(&self) -> Verdict;
    /// Signature string; empty when the producer supplied none
    fn signature(&self) -> &str;
    /// Explicit band, if the producer assigned one
    fn band(&self) -> Option<u8>;
    /// Unified risk: metrics risk, then legacy last_risk, then the
    /// baseline's last risk, then a legacy top-level risk
    fn risk(&self) -> Option<f64>;
    /// Spectral instability (specH)
    fn instability(&self) -> Option<f64>;
    /// Drift accumulator (cusum)
    fn drift(&self) -> Option<f64>;
    /// Baseline snapshot; all-zero when the producer supplied none
    fn baseline(&self) -> Baseline;
    /// Trailing trajectory cycle, if present
    fn trajectory(&self) -> Option<&[FlowerPoint]>;
    /// Metric snapshot persisted alongside the atom
    fn metrics_snapshot(&self) -> ReportMetrics;
}

impl SignalSource for NavigatorReport {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn verdict(&self) -> Verdict {
        self.verdict
    }

    fn signature(&self) -> &str {
        self.dna.as_deref().unwrap_or("")
    }

    fn band(&self) -> Option<u8> {
        self.band
    }

    fn risk(&self) -> Option<f64> {
        let m = self.metrics_view();
        m.and_then(|m| m.risk)
            .or_else(|| m.and_then(|m| m.last_risk))
            .or_else(|| self.baseline.map(|b| b.last_risk))
            .or(self.risk)
    }

    fn instability(&self) -> Option<f64> {
        self.metrics_view().and_then(|m| m.spec_h)
    }

    fn drift(&self) -> Option<f64> {
        self.metrics_view().and_then(|m| m.cusum)
    }

    fn baseline(&self) -> Baseline {
        self.baseline.unwrap_or_default()
    }

    fn trajectory(&self) -> Option<&[FlowerPoint]> {
        self.flower_cycle.as_deref()
    }

    fn metrics_snapshot(&self) -> ReportMetrics {
        let mut snapshot = self.metrics_view().cloned().unwrap_or_default();
        if snapshot.risk.is_none() {
            snapshot.risk = SignalSource::risk(self);
        }
        snapshot
    }
}
