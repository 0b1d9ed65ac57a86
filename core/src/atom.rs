//! Memory atom builder
//!
//! Collapses one verdict record into the persisted unit of memory: a
//! signature key, a severity band, a 6-way phase direction, the combined
//! 1..42 phase state, an optional trajectory invariant, and a
//! content-derived identity hash over the stable field subset.
//! Timestamps and free-form context never enter the hash, so two
//! independently built atoms describing the same structural event hash
//! identically.

use crate::config::HfsConfig;
use crate::dna::band_from_verdict;
use crate::dna::normalize_dna_key;
use crate::dna::risk_to_band;
use crate::errors::{HfsError, Result};
use crate::flower::FlowerInvariant;
use crate::navigator::Baseline;
use crate::navigator::Verdict;
use crate::report::ReportMetrics;
use crate::report::SignalSource;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use sha2::Sha256;
use std::collections::BTreeMap;

/// Instability anchor used when a report carries no specH and for the
/// no-previous-window delta
const NEUTRAL_INSTABILITY: f64 = 0.5;

/// Decimal precision for floats entering the identity hash
const HASH_PRECISION: f64 = 1e6;

/// The persisted unit of memory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryAtom {
    pub kind: String,
    pub version: String,
    /// Content-derived identity hash (hex SHA-256 of the stable subset)
    pub atom_id: String,
    pub verdict: Verdict,
    /// Full signature string as supplied by the producer
    #[serde(default)]
    pub dna: String,
    /// Normalized signature key (first tokens joined by `|`)
    #[serde(default)]
    pub dna_key: String,
    /// Severity band 1..=7, 1 hottest
    pub band: u8,
    /// Phase direction 0..=5
    #[serde(default)]
    pub phase_dir: u8,
    /// Combined phase code, (band-1)*6 + dir + 1, in 1..=42
    #[serde(default = "default_phase_state")]
    pub phase_state: u8,
    #[serde(default)]
    pub baseline: Baseline,
    #[serde(default)]
    pub metrics: ReportMetrics,
    /// Trajectory invariant, when the report carried a usable cycle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flower: Option<FlowerInvariant>,
    /// Crystallization key: `kind:dna_key`, or kind alone without a key
    pub crystal: String,
    /// Free-form context (repo/ref/note); excluded from the identity hash
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

fn default_phase_state() -> u8 {
    1
}

/// Signals of the previous window, used for phase-direction deltas
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PrevSignals {
    pub risk: f64,
    pub spec_h: f64,
    pub cusum: f64,
}

/// Build a memory atom from a verdict record.
///
/// Band resolution: the producer's explicit band (clamped to 1..=7), else
/// the risk-to-band step function when a risk is available, else the
/// verdict fallback. Phase deltas are taken against `prev` when given,
/// otherwise against the baseline's last risk and a neutral 0.5
/// instability anchor with zero drift.
pub fn build_atom(
    source: &dyn SignalSource,
    prev: Option<PrevSignals>,
    context: BTreeMap<String, String>,
    cfg: &HfsConfig,
) -> Result<MemoryAtom> {
    let verdict = source.verdict();
    let dna = source.signature().to_string();
    let dna_key = normalize_dna_key(&dna, cfg.encoder.key_len);
    let baseline = source.baseline();
    let metrics = source.metrics_snapshot();

    let band = match source.band() {
        Some(b) => b.clamp(1, 7),
        None => match metrics.risk {
            Some(r) => risk_to_band(r),
            None => band_from_verdict(verdict),
        },
    };

    let risk_now = metrics.risk.unwrap_or(baseline.last_risk);
    let spec_now = metrics.spec_h.unwrap_or(NEUTRAL_INSTABILITY);
    let cusum_now = metrics.cusum.unwrap_or(0.0);

    let (prev_risk, prev_spec, prev_cusum) = match prev {
        Some(p) => (p.risk, p.spec_h, p.cusum),
        None => (baseline.last_risk, NEUTRAL_INSTABILITY, 0.0),
    };

    let phase_dir = phase_direction(
        risk_now - prev_risk,
        spec_now - prev_spec,
        cusum_now - prev_cusum,
        cfg.atom.cusum_gate,
    );
    let phase_state = phase_state(band, phase_dir);

    let flower = source.trajectory().and_then(|pts| {
        let pairs: Vec<[f64; 2]> = pts.iter().map(|p| [p.risk, p.spec_h]).collect();
        FlowerInvariant::from_cycle(&pairs)
    });

    let crystal = if dna_key.is_empty() {
        source.kind().to_string()
    } else {
        format!("{}:{dna_key}", source.kind())
    };

    let mut atom = MemoryAtom {
        kind: source.kind().to_string(),
        version: source.version().to_string(),
        atom_id: String::new(),
        verdict,
        dna,
        dna_key,
        band,
        phase_dir,
        phase_state,
        baseline,
        metrics,
        flower,
        crystal,
        context,
    };
    atom.atom_id = compute_atom_id(&atom)?;
    Ok(atom)
}

/// Classify the signed deltas into a 6-way direction.
///
/// Quadrant of (Δrisk, Δspec) signs: 0 (+,+), 1 (+,−), 2 (−,+), 3 (−,−),
/// with zero counting as rising. A |Δcusum| beyond the gate dominates and
/// forces the shadow directions 4 (rising drift) or 5 (falling drift)
/// regardless of the risk/instability signs.
pub fn phase_direction(d_risk: f64, d_spec: f64, d_cusum: f64, gate: f64) -> u8 {
    if d_cusum.abs() > gate {
        return if d_cusum > 0.0 { 4 } else { 5 };
    }
    match (d_risk >= 0.0, d_spec >= 0.0) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    }
}

/// Combined phase code in 1..=42
pub fn phase_state(band: u8, dir: u8) -> u8 {
    let b = band.clamp(1, 7);
    let d = dir.min(5);
    (b - 1) * 6 + d + 1
}

/// Recover (band, direction) from a phase state
pub fn phase_parts(state: u8) -> (u8, u8) {
    let s = state.clamp(1, 42) - 1;
    (s / 6 + 1, s % 6)
}

/// Coarse phase-state zone used by store stats
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PhaseZone {
    Z1,
    Z2,
    Z3,
    Z4,
}

impl PhaseZone {
    pub fn from_state(state: u8) -> Self {
        match state {
            0..=14 => Self::Z1,
            15..=24 => Self::Z2,
            25..=34 => Self::Z3,
            _ => Self::Z4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Z1 => "Z1",
            Self::Z2 => "Z2",
            Self::Z3 => "Z3",
            Self::Z4 => "Z4",
        }
    }
}

// Hash payload structs. Fields are declared in alphabetical key order so
// the derived serialization is already the canonical key-sorted JSON.
#[derive(Serialize)]
struct HashBaseline {
    block_threshold: f64,
    mu: f64,
    sigma: f64,
    warn_threshold: f64,
}

#[derive(Serialize)]
struct HashMetrics {
    cusum: Option<f64>,
    risk: Option<f64>,
    #[serde(rename = "specH")]
    spec_h: Option<f64>,
}

#[derive(Serialize)]
struct HashPayload<'a> {
    band: u8,
    baseline: HashBaseline,
    dna_key: &'a str,
    flower_area: Option<f64>,
    kind: &'a str,
    metrics: HashMetrics,
    phase_state: u8,
    verdict: &'a str,
    version: &'a str,
}

/// Identity hash over the stable field subset of an atom.
///
/// Strength, timestamps, and context never enter the hash. Floats are
/// quantized to 6 decimal places first so float noise cannot churn
/// identities.
pub fn compute_atom_id(atom: &MemoryAtom) -> Result<String> {
    let payload = HashPayload {
        band: atom.band,
        baseline: HashBaseline {
            block_threshold: quantize(atom.baseline.block_threshold),
            mu: quantize(atom.baseline.mu),
            sigma: quantize(atom.baseline.sigma),
            warn_threshold: quantize(atom.baseline.warn_threshold),
        },
        dna_key: &atom.dna_key,
        flower_area: atom.flower.as_ref().map(|f| quantize(f.petal_area)),
        kind: &atom.kind,
        metrics: HashMetrics {
            cusum: atom.metrics.cusum.map(quantize),
            risk: atom.metrics.risk.map(quantize),
            spec_h: atom.metrics.spec_h.map(quantize),
        },
        phase_state: atom.phase_state,
        verdict: atom.verdict.as_str(),
        version: &atom.version,
    };

    let canon = serde_json::to_string(&payload)
        .map_err(|e| HfsError::internal_with_source("failed to canonicalize atom payload", e))?;

    let mut hasher = Sha256::new();
    hasher.update(canon.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn quantize(x: f64) -> f64 {
    (x * HASH_PRECISION).round() / HASH_PRECISION
}
