//! `hfs` — score behavioral sessions and manage the topological memory store.
//!
//! Stdout carries machine-readable JSON only; logs and human-facing summary
//! lines go to stderr so reports can be piped straight into the validator
//! or a CI step.

mod memory_cmd;
mod run_cmd;
mod validate_cmd;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "hfs", version, about = "Behavioral stream navigator and memory")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Synthesize a session, score it, and print the report
    Run(run_cmd::RunArgs),

    /// Convert a report into a memory atom and upsert it into the store
    Record(memory_cmd::RecordArgs),

    /// Search the memory store
    Query(memory_cmd::QueryArgs),

    /// Print memory store statistics
    Stats(memory_cmd::StatsArgs),

    /// Rewrite a report's thresholds from memory history
    Meta(memory_cmd::MetaArgs),

    /// Gate on a report verdict: exit 0 ALLOW, 2 WARN, 3 BLOCK
    Validate(validate_cmd::ValidateArgs),
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run(args) => report_errors(run_cmd::run(args)),
        Command::Record(args) => report_errors(memory_cmd::record(args)),
        Command::Query(args) => report_errors(memory_cmd::query(args)),
        Command::Stats(args) => report_errors(memory_cmd::stats(args)),
        Command::Meta(args) => report_errors(memory_cmd::meta(args)),
        Command::Validate(args) => validate_cmd::run(args),
    };
    std::process::exit(code);
}

fn report_errors(result: anyhow::Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("hfs: {err:#}");
            1
        }
    }
}

fn init_logging() {
    let default_level = "warn";
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
