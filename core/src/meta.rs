//! Meta-controller: history-driven threshold shrink
//!
//! Reads matching rows from the memory store and computes a bounded
//! multiplicative shrink for the navigator's warn/block thresholds.
//! Matching is deterministic: the exact-crystal row first, then same-kind
//! rows whose signature token Jaccard similarity clears the configured
//! minimum, ordered by (strength desc, last_seen desc, crystal asc) and
//! capped at `lookback`. Matches are counted as total row strength, so a
//! merged row still weighs as many observations as went into it.
//!
//! Reflex = block_weight * BLOCK-rate + band_weight * mean band hotness
//! ((7 - band) / 6), both strength-weighted. Shrink = 1 - min(max_shrink,
//! reflex), so with the defaults it stays inside [0.65, 1.0]. Sparse
//! history (total strength below `min_matches`) yields exactly 1.0.

use crate::config::HfsConfig;
use crate::dna::dna_tokens;
use crate::dna::normalize_dna_key;
use crate::navigator::Baseline;
use crate::navigator::Verdict;
use crate::report::SignalSource;
use crate::store::MemoryStore;
use crate::store::StoredAtom;
use std::collections::BTreeSet;

/// Outcome of a meta-controller consultation
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetaAdjustment {
    /// Multiplier for the warn/block thresholds, in [1 - max_shrink, 1]
    pub shrink: f64,
    /// Strength-weighted count of the historical observations behind it
    pub matches: f64,
}

impl MetaAdjustment {
    /// No-effect adjustment
    pub fn neutral() -> Self {
        Self {
            shrink: 1.0,
            matches: 0.0,
        }
    }
}

/// Consult history for a report's signature
pub fn shrink_for(source: &dyn SignalSource, store: &MemoryStore, cfg: &HfsConfig) -> MetaAdjustment {
    shrink_for_signature(source.kind(), source.signature(), store, cfg)
}

/// Consult history for a (kind, signature) pair. A signature without any
/// usable tokens yields the neutral adjustment.
pub fn shrink_for_signature(
    kind: &str,
    dna: &str,
    store: &MemoryStore,
    cfg: &HfsConfig,
) -> MetaAdjustment {
    let dna_key = normalize_dna_key(dna, cfg.encoder.key_len);
    if dna_key.is_empty() {
        return MetaAdjustment::neutral();
    }
    let crystal = format!("{kind}:{dna_key}");
    let own_tokens = token_set(dna);

    let mut rows: Vec<&StoredAtom> = Vec::new();
    if let Some(exact) = store.get(&crystal) {
        rows.push(exact);
    }

    let mut fuzzy: Vec<&StoredAtom> = store
        .rows()
        .filter(|r| r.atom.crystal != crystal && r.atom.kind == kind)
        .filter(|r| jaccard(&own_tokens, &token_set(&r.atom.dna)) >= cfg.meta.jaccard_min)
        .collect();
    fuzzy.sort_by(|a, b| {
        b.strength
            .cmp(&a.strength)
            .then_with(|| b.last_seen.total_cmp(&a.last_seen))
            .then_with(|| a.atom.crystal.cmp(&b.atom.crystal))
    });
    rows.extend(fuzzy);
    rows.truncate(cfg.meta.lookback.max(1));

    let total: f64 = rows.iter().map(|r| f64::from(r.strength)).sum();
    if total < f64::from(cfg.meta.min_matches) {
        tracing::debug!(crystal = %crystal, matches = total, "history too sparse for shrink");
        return MetaAdjustment {
            shrink: 1.0,
            matches: total,
        };
    }

    let block: f64 = rows
        .iter()
        .filter(|r| r.atom.verdict == Verdict::Block)
        .map(|r| f64::from(r.strength))
        .sum();
    let hot: f64 = rows
        .iter()
        .map(|r| f64::from(r.strength) * band_hotness(r.atom.band))
        .sum();

    let reflex = cfg.meta.block_weight * (block / total) + cfg.meta.band_weight * (hot / total);
    let shrink = (1.0 - reflex.min(cfg.meta.max_shrink)).clamp(1.0 - cfg.meta.max_shrink, 1.0);

    tracing::debug!(crystal = %crystal, matches = total, reflex, shrink, "meta shrink computed");
    MetaAdjustment {
        shrink,
        matches: total,
    }
}

/// Scale the warn/block thresholds of a baseline; mu, sigma, and
/// last_risk are never touched.
pub fn apply_shrink(baseline: &Baseline, factor: f64) -> Baseline {
    Baseline {
        warn_threshold: baseline.warn_threshold * factor,
        block_threshold: baseline.block_threshold * factor,
        ..*baseline
    }
}

/// Band hotness: 1 at band 1, 0 at band 7
fn band_hotness(band: u8) -> f64 {
    f64::from(7u8.saturating_sub(band).min(6)) / 6.0
}

fn token_set(dna: &str) -> BTreeSet<&str> {
    dna_tokens(dna).into_iter().collect()
}

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    inter / union
}
