use std::collections::BTreeMap;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use hfs_core::meta::{apply_shrink, shrink_for};
use hfs_core::store::StoredAtom;
use hfs_core::{
    build_atom, HfsConfig, MemoryQuery, MemoryStore, NavigatorReport, Verdict,
};
use serde::Serialize;

#[derive(Debug, Parser)]
pub struct RecordArgs {
    /// Path to a navigator report JSON
    #[arg(long)]
    report: PathBuf,

    /// JSONL store path
    #[arg(long)]
    store: PathBuf,

    /// Repo identifier attached to the atom context
    #[arg(long)]
    repo: Option<String>,

    /// Commit/PR/session reference attached to the atom context
    #[arg(long = "ref")]
    git_ref: Option<String>,

    /// Short note attached to the atom context
    #[arg(long)]
    note: Option<String>,

    /// How many signature tokens form the dna_key
    #[arg(long = "key-len")]
    key_len: Option<usize>,

    /// Dominance gate for the drift-shadow phase override
    #[arg(long = "cusum-gate")]
    cusum_gate: Option<f64>,

    /// Petal area gate for bonus strength
    #[arg(long = "flower-gate")]
    flower_gate: Option<f64>,

    /// Bonus strength when the petal area clears the gate
    #[arg(long = "flower-bonus")]
    flower_bonus: Option<u32>,

    /// Do not print the stored row
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Parser)]
pub struct QueryArgs {
    /// JSONL store path
    #[arg(long)]
    store: PathBuf,

    /// Filter by verdict (ALLOW / WARN / BLOCK)
    #[arg(long)]
    verdict: Option<Verdict>,

    /// Minimum band (1 = hottest)
    #[arg(long = "band-min")]
    band_min: Option<u8>,

    /// Maximum band
    #[arg(long = "band-max")]
    band_max: Option<u8>,

    /// Exact phase state (1..42)
    #[arg(long = "phase-state")]
    phase_state: Option<u8>,

    /// Exact crystal key
    #[arg(long)]
    crystal: Option<String>,

    /// Exact dna_key match
    #[arg(long = "dna-key")]
    dna_key: Option<String>,

    /// Substring match inside the signature
    #[arg(long = "contains")]
    dna_contains: Option<String>,

    /// Filter by report kind
    #[arg(long)]
    kind: Option<String>,

    /// Only rows with strength >= N
    #[arg(long = "min-strength")]
    min_strength: Option<u32>,

    /// Maximum rows returned
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

#[derive(Debug, Parser)]
pub struct StatsArgs {
    /// JSONL store path
    #[arg(long)]
    store: PathBuf,
}

#[derive(Debug, Parser)]
pub struct MetaArgs {
    /// Path to a navigator report JSON
    #[arg(long)]
    report: PathBuf,

    /// JSONL store path
    #[arg(long)]
    store: PathBuf,

    /// How many history rows to consider
    #[arg(long)]
    lookback: Option<usize>,

    /// Evidence gate: fewer weighted matches leave thresholds untouched
    #[arg(long = "min-matches")]
    min_matches: Option<u32>,

    /// Hard cap on threshold shrink (0.35 ⇒ factor floor 0.65)
    #[arg(long = "max-shrink")]
    max_shrink: Option<f64>,
}

pub fn record(args: RecordArgs) -> Result<()> {
    let mut cfg = HfsConfig::load(None).context("failed to load config")?;
    if let Some(key_len) = args.key_len {
        cfg.encoder.key_len = key_len;
    }
    if let Some(gate) = args.cusum_gate {
        cfg.atom.cusum_gate = gate;
    }
    if let Some(gate) = args.flower_gate {
        cfg.store.flower_gate = gate;
    }
    if let Some(bonus) = args.flower_bonus {
        cfg.store.flower_bonus = bonus;
    }

    let report = load_report(&args.report)?;

    let mut context = BTreeMap::new();
    if let Some(repo) = args.repo {
        context.insert("repo".to_string(), repo);
    }
    if let Some(git_ref) = args.git_ref {
        context.insert("ref".to_string(), git_ref);
    }
    if let Some(note) = args.note {
        context.insert("note".to_string(), note);
    }

    let atom = build_atom(&report, None, context, &cfg)?;
    let mut store = open_store(&args.store, &cfg)?;
    let stored = store.upsert(atom)?;

    tracing::debug!(
        crystal = %stored.atom.crystal,
        strength = stored.strength,
        "atom recorded"
    );
    if !args.quiet {
        print_json(&stored)?;
    }
    Ok(())
}

pub fn query(args: QueryArgs) -> Result<()> {
    let cfg = HfsConfig::load(None).context("failed to load config")?;
    let store = open_store(&args.store, &cfg)?;

    let q = MemoryQuery {
        verdict: args.verdict,
        band_min: args.band_min,
        band_max: args.band_max,
        phase_state: args.phase_state,
        crystal: args.crystal,
        dna_key: args.dna_key,
        dna_contains: args.dna_contains,
        kind: args.kind,
        min_strength: args.min_strength,
        limit: args.limit,
    };

    let rows = store.query(&q);
    print_json(&QueryOutput {
        count: rows.len(),
        items: &rows,
    })
}

pub fn stats(args: StatsArgs) -> Result<()> {
    let cfg = HfsConfig::load(None).context("failed to load config")?;
    let store = open_store(&args.store, &cfg)?;
    print_json(&store.stats())
}

pub fn meta(args: MetaArgs) -> Result<()> {
    let mut cfg = HfsConfig::load(None).context("failed to load config")?;
    if let Some(lookback) = args.lookback {
        cfg.meta.lookback = lookback;
    }
    if let Some(min_matches) = args.min_matches {
        cfg.meta.min_matches = min_matches;
    }
    if let Some(max_shrink) = args.max_shrink {
        cfg.meta.max_shrink = max_shrink;
    }

    let mut report = load_report(&args.report)?;
    let store = open_store(&args.store, &cfg)?;

    // A report without a baseline has nothing to shrink; emit it unchanged
    // with a neutral meta block.
    let (shrink, matches) = match report.baseline {
        Some(baseline) => {
            let adj = shrink_for(&report, &store, &cfg);
            report.baseline = Some(apply_shrink(&baseline, adj.shrink));
            (adj.shrink, adj.matches)
        }
        None => (1.0, 0.0),
    };

    let meta = report.meta.get_or_insert_with(Default::default);
    meta.shrink = Some(shrink);
    meta.matches = Some(matches);
    meta.store = Some(args.store.display().to_string());

    let json = report.to_json_pretty()?;
    let mut out = BufWriter::new(io::stdout());
    out.write_all(json.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    count: usize,
    items: &'a [StoredAtom],
}

fn load_report(path: &Path) -> Result<NavigatorReport> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read report {}", path.display()))?;
    NavigatorReport::from_json_str(&raw)
        .with_context(|| format!("invalid report {}", path.display()))
}

fn open_store(path: &Path, cfg: &HfsConfig) -> Result<MemoryStore> {
    MemoryStore::open(path, cfg.store.clone())
        .with_context(|| format!("failed to open store {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = BufWriter::new(io::stdout());
    serde_json::to_writer_pretty(&mut out, value)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}
