//! Deterministic synthetic session generator.
//!
//! Produces chat/ide event streams that look like a working session drifting
//! in and out of focus: a latent pressure level does a random walk with
//! occasional spikes, and rewrite rate, pause length, message structure, and
//! edit bursts all correlate with it. Streams are reproducible from the seed
//! alone, which is what the pipeline tests and the demo CLI rely on.

#![deny(clippy::print_stdout, clippy::print_stderr)]

use hfs_core::{Channel, EventFeatures, EventKind, HfsEvent};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

const TOPICS: [&str; 10] = [
    "ship",
    "prototype",
    "refactor",
    "investor",
    "docs",
    "demo",
    "ci",
    "ai_agent",
    "vr",
    "hfs",
];

const NOISE: [&str; 6] = ["umm", "maybe", "idk", "random", "all at once", "???"];

/// Seconds between consecutive messages
const MESSAGE_SPACING_S: f64 = 0.9;

/// Generator parameters
#[derive(Clone, Copy, Debug)]
pub struct SimConfig {
    pub seed: u64,
    pub events: usize,
    /// Timestamp of the first event
    pub start_at: f64,
}

impl SimConfig {
    pub fn new(seed: u64, events: usize) -> Self {
        Self {
            seed,
            events,
            start_at: 0.0,
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(42, 220)
    }
}

/// Generate a synthetic session of `cfg.events` messages plus occasional
/// edit-burst events. The same seed always yields the same stream.
pub fn generate_session(cfg: &SimConfig) -> Vec<HfsEvent> {
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let mut events = Vec::with_capacity(cfg.events + cfg.events / 4);

    let mut topic = *TOPICS.choose(&mut rng).unwrap_or(&TOPICS[0]);
    let mut last_text = String::new();

    // Latent session state
    let mut pressure: f64 = 0.2;

    for i in 0..cfg.events {
        if rng.random::<f64>() < 0.18 {
            topic = *TOPICS.choose(&mut rng).unwrap_or(&topic);
        }

        if rng.random::<f64>() < 0.10 {
            pressure = (pressure + rng.random_range(0.25..0.50)).clamp(0.0, 1.0);
        } else {
            pressure = (pressure - rng.random_range(0.01..0.03)).clamp(0.0, 1.0);
        }

        let rewrite_rate =
            (0.05 + 0.70 * pressure + rng.random_range(-0.05..0.05)).clamp(0.0, 1.0);

        let structured = pressure < 0.35 && rng.random::<f64>() < 0.55;
        let text = gen_message(&mut rng, topic, structured);
        let contradiction = contradiction_proxy(&last_text, &text);
        last_text.clone_from(&text);

        let pause_s = gauss(&mut rng, 0.6 + 1.2 * pressure, 0.25).clamp(0.05, 4.0);
        let edits = (rewrite_rate * rng.random_range(0.0..6.0)).round() as u32;

        let t = cfg.start_at + i as f64 * MESSAGE_SPACING_S;
        events.push(HfsEvent {
            t,
            channel: Channel::Chat,
            kind: EventKind::Message,
            topic: topic.to_string(),
            features: EventFeatures {
                len: text.len() as u32,
                pause_s: round3(pause_s),
                edits,
                structure: round3(structure_score(&text)),
                contradiction,
            },
        });

        // Heavy rewriting sometimes spills into the editor
        if edits >= 3 && rng.random::<f64>() < 0.35 {
            events.push(HfsEvent {
                t: t + 0.2,
                channel: Channel::Ide,
                kind: EventKind::Edit,
                topic: topic.to_string(),
                features: EventFeatures {
                    len: 0,
                    pause_s: 0.0,
                    edits,
                    structure: 0.0,
                    contradiction: 0.0,
                },
            });
        }
    }

    events
}

fn gen_message(rng: &mut StdRng, topic: &str, structured: bool) -> String {
    let base = match topic {
        "ship" => "We should ship the MVP and get feedback.",
        "prototype" => "Let's build a minimal prototype and measure risk.",
        "refactor" => "We need to refactor to reduce dependency pressure.",
        "investor" => "We need a clean explanation for decision-makers.",
        "docs" => "Write a one-screen README with steps.",
        "demo" => "Run a demo and export JSON for AI.",
        "ci" => "Add a GitHub Action gate.",
        "ai_agent" => "An agent should read the report and decide.",
        "vr" => "Connect the idea to VR later, but keep it software now.",
        "hfs" => "We need a stream format to capture human interaction.",
        _ => "Let's continue.",
    };

    if structured {
        return format!("{base}\n1. Define input\n2. Compute metrics\n3. Output verdict\n");
    }
    let a = NOISE.choose(rng).unwrap_or(&NOISE[0]);
    let b = NOISE.choose(rng).unwrap_or(&NOISE[0]);
    format!("{base} {a} {b}")
}

/// Cheap proxy for structured thinking: numbered steps, bullets, and short
/// lines each add to the score. Returns 0..1.
fn structure_score(text: &str) -> f64 {
    if text.is_empty() {
        return 0.0;
    }
    let mut score: f64 = 0.0;
    if text.contains("\n-") || text.contains("\n*") {
        score += 0.35;
    }
    if (1..6).any(|i| text.contains(&format!("{i}."))) {
        score += 0.35;
    }
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|ln| !ln.is_empty())
        .collect();
    if !lines.is_empty() {
        let avg_len = lines.iter().map(|ln| ln.len()).sum::<usize>() as f64 / lines.len() as f64;
        if avg_len <= 60.0 {
            score += 0.30;
        }
    }
    score.clamp(0.0, 1.0)
}

/// Polarity-flip proxy: a stated want followed by its negation. Returns
/// 0 or 1.
fn contradiction_proxy(prev: &str, cur: &str) -> f64 {
    if prev.is_empty() || cur.is_empty() {
        return 0.0;
    }
    let p = prev.to_lowercase();
    let c = cur.to_lowercase();
    let negated = ["no", "not", "don't", "do not"].iter().any(|n| c.contains(n));
    if p.contains("i want") && negated && (c.contains("i want") || c.contains("i need")) {
        return 1.0;
    }
    0.0
}

/// Box-Muller normal sample
fn gauss(rng: &mut StdRng, mu: f64, sigma: f64) -> f64 {
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    mu + sigma * z
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}
