//! End-to-end scoring session.
//!
//! Runs the full pipeline over one event stream: window metrics, risk
//! series, spectral entropy, drift alarm, history-informed threshold
//! shrink, verdict, and finally the wire report.

use crate::config::HfsConfig;
use crate::dna::{make_dna, risk_to_band};
use crate::drift::cusum_drift;
use crate::event::HfsEvent;
use crate::flower::CYCLE_LEN;
use crate::meta::{self, MetaAdjustment};
use crate::navigator;
use crate::report::{
    recommendation_for, FlowerPoint, NavigatorReport, ReportMeta, ReportMetrics, REPORT_KIND,
    REPORT_VERSION,
};
use crate::signal::{compute_windows, WindowMetrics};
use crate::spectral::spectral_entropy;
use crate::store::MemoryStore;

/// Score one event stream and produce a navigator report.
///
/// When `store` is given, the session signature is looked up in memory and
/// the baseline thresholds are shrunk before the final classification; the
/// applied factor lands in `meta.shrink`.
pub fn score_events(
    events: &[HfsEvent],
    cfg: &HfsConfig,
    store: Option<&MemoryStore>,
) -> NavigatorReport {
    let windows = compute_windows(events, &cfg.signal);
    let risks: Vec<f64> = windows.iter().map(|w| w.risk).collect();

    let drift = cusum_drift(&risks, &cfg.signal);
    let spec_h = spectral_entropy(&risks, &cfg.signal);
    let last = windows.last().copied().unwrap_or_default();

    // The first pass runs with neutral thresholds to fix the signature used
    // for the history lookup; the second pass classifies against the shrunk
    // thresholds and refreshes the verdict flags in the signature.
    let base = navigator::evaluate(&risks, drift.fired, 1.0, &cfg.navigator);
    let provisional_dna = make_dna(&last, base.verdict, &cfg.encoder);

    let adjustment = match store {
        Some(store) => meta::shrink_for_signature(REPORT_KIND, &provisional_dna, store, cfg),
        None => MetaAdjustment::neutral(),
    };

    let decision = navigator::evaluate(&risks, drift.fired, adjustment.shrink, &cfg.navigator);
    let dna = make_dna(&last, decision.verdict, &cfg.encoder);
    if decision.alarm_escalated {
        tracing::debug!(peak = decision.baseline.last_risk, "drift alarm escalated verdict to WARN");
    }

    NavigatorReport {
        kind: REPORT_KIND.to_string(),
        version: REPORT_VERSION.to_string(),
        verdict: decision.verdict,
        dna: Some(dna),
        band: Some(risk_to_band(last.risk)),
        metrics: None,
        metrics_last_window: Some(metrics_on_wire(&last, spec_h, drift.final_sum)),
        baseline: Some(decision.baseline),
        flower_cycle: flower_cycle(&risks, cfg),
        recommendation: Some(recommendation_for(decision.verdict).to_string()),
        meta: Some(ReportMeta {
            seed: None,
            events: Some(events.len()),
            windows: Some(windows.len()),
            window_size: Some(cfg.signal.window_size),
            shrink: store.map(|_| adjustment.shrink),
            matches: store.map(|_| adjustment.matches),
            store: store.map(|s| s.path().display().to_string()),
        }),
        risk: None,
    }
}

/// Trailing trajectory: one `(risk, specH-so-far)` point per window over the
/// last [`CYCLE_LEN`] windows.
fn flower_cycle(risks: &[f64], cfg: &HfsConfig) -> Option<Vec<FlowerPoint>> {
    if risks.is_empty() {
        return None;
    }
    let start = risks.len().saturating_sub(CYCLE_LEN);
    let points = (start..risks.len())
        .map(|i| FlowerPoint {
            risk: risks[i],
            spec_h: spectral_entropy(&risks[..=i], &cfg.signal),
        })
        .collect();
    Some(points)
}

fn metrics_on_wire(w: &WindowMetrics, spec_h: f64, cusum: f64) -> ReportMetrics {
    ReportMetrics {
        topic_drift: Some(w.topic_drift),
        rewrite: Some(w.rewrite),
        pressure_spike: Some(w.pressure_spike),
        stability: Some(w.stability),
        contradiction: Some(w.contradiction),
        focus: Some(w.focus),
        risk: Some(w.risk),
        last_risk: None,
        spec_h: Some(spec_h),
        cusum: Some(cusum),
    }
}
