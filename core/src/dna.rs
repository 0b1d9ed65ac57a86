//! Signature ("DNA") and severity band encoding
//!
//! The DNA string is a lossy discretization of the last window's metrics:
//! each metric becomes a tagged 0..3 level token, in the fixed order
//! `T R P S C F`, followed by the verdict flags `W` (WARN) and `M` (BLOCK).
//! Bands run 1..=7 with 1 the hottest.

use crate::config::EncoderConfig;
use crate::navigator::Verdict;
use crate::signal::WindowMetrics;

/// Discretize a 0..1 metric into a 0..3 level via the cut points.
/// Values at a cut fall into the lower level.
pub fn level(x: f64, cuts: &[f64; 3]) -> u8 {
    if x <= cuts[0] {
        0
    } else if x <= cuts[1] {
        1
    } else if x <= cuts[2] {
        2
    } else {
        3
    }
}

/// Encode the last window's metrics and the verdict into the DNA string,
/// e.g. `"T2 R1 P0 S1 C0 F1 W0 M0"`.
pub fn make_dna(last: &WindowMetrics, verdict: Verdict, cfg: &EncoderConfig) -> String {
    let cuts = &cfg.level_cuts;
    let t = level(last.topic_drift, cuts);
    let r = level(last.rewrite, cuts);
    let p = level(last.pressure_spike, cuts);
    let s = level(last.stability, cuts);
    let c = level(last.contradiction, cuts);
    let f = level(last.focus, cuts);
    let w = u8::from(verdict == Verdict::Warn);
    let m = u8::from(verdict == Verdict::Block);
    format!("T{t} R{r} P{p} S{s} C{c} F{f} W{w} M{m}")
}

/// Split a DNA string into its well-formed tokens.
///
/// Accepts both the bare token form and the legacy `DNA:`-prefixed form
/// found in older reports. Tokens must start with a letter and end with a
/// digit; anything else is dropped.
pub fn dna_tokens(dna: &str) -> Vec<&str> {
    let trimmed = dna.trim();
    let body = match trimmed.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("dna:") => trimmed[4..].trim_start(),
        _ => trimmed,
    };

    body.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| is_tagged_token(t))
        .collect()
}

/// Normalize a DNA string into the signature key: the first `key_len`
/// well-formed tokens joined by `|`. An empty or tokenless input
/// yields "".
pub fn normalize_dna_key(dna: &str, key_len: usize) -> String {
    let toks = dna_tokens(dna);
    toks[..toks.len().min(key_len.max(1))].join("|")
}

fn is_tagged_token(tok: &str) -> bool {
    let bytes = tok.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[bytes.len() - 1].is_ascii_digit()
}

/// Map continuous risk in [0,1] to a band 1..=7 (0 → 7, 1 → 1).
/// The epsilon keeps risks sitting exactly on a step edge in the hotter
/// band rather than flapping on float noise.
pub fn risk_to_band(risk: f64) -> u8 {
    let r = risk.clamp(0.0, 1.0);
    let b = 7 - (r * 6.0 + 1e-9).floor() as i32;
    b.clamp(1, 7) as u8
}

/// Fallback band when the report carries no usable risk: verdict severity
/// maps straight to a representative band.
pub fn band_from_verdict(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Block => 1,
        Verdict::Warn => 3,
        Verdict::Allow => 6,
    }
}
