use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hfs_core::{score_events, HfsConfig, MemoryStore};
use hfs_simulator::{generate_session, SimConfig};

#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Simulator seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of messages to synthesize
    #[arg(long, default_value_t = 220)]
    events: usize,

    /// Window size in events (overrides config)
    #[arg(long)]
    window: Option<usize>,

    /// Write the generated event stream as JSONL to this path
    #[arg(long = "dump-events")]
    dump_events: Option<PathBuf>,

    /// Memory store to consult for threshold adaptation
    #[arg(long)]
    store: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Config file (defaults to ~/.config/hfs/hfs.toml or $HFS_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
}

pub fn run(args: RunArgs) -> Result<()> {
    let mut cfg = HfsConfig::load(args.config.as_deref()).context("failed to load config")?;
    if let Some(window) = args.window {
        cfg.signal.window_size = window.max(1);
    }

    let events = generate_session(&SimConfig::new(args.seed, args.events));
    tracing::debug!(seed = args.seed, events = events.len(), "session synthesized");

    if let Some(path) = &args.dump_events {
        let file = File::create(path)
            .with_context(|| format!("failed to create event dump {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        for event in &events {
            serde_json::to_writer(&mut writer, event)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        eprintln!("wrote {} events to {}", events.len(), path.display());
    }

    let store = match &args.store {
        Some(path) => Some(
            MemoryStore::open(path, cfg.store.clone())
                .with_context(|| format!("failed to open store {}", path.display()))?,
        ),
        None => None,
    };

    let mut report = score_events(&events, &cfg, store.as_ref());
    if let Some(meta) = report.meta.as_mut() {
        meta.seed = Some(args.seed);
    }

    let json = report.to_json_pretty()?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report {}", path.display()))?;
            eprintln!("wrote report to {}", path.display());
        }
        None => {
            let mut out = BufWriter::new(io::stdout());
            out.write_all(json.as_bytes())?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
    }
    Ok(())
}
