//! Verdict gate for CI pipelines.
//!
//! Reads a navigator report and converts the verdict into an exit code.
//! Anything that cannot be parsed into a known verdict fails safe: a
//! report this tool cannot trust must stop the pipeline, not wave it
//! through.
//!
//! ## Exit codes
//!
//! - 0: ALLOW
//! - 2: WARN
//! - 3: BLOCK, or a missing/unreadable/unknown-verdict report

use std::path::PathBuf;

use clap::Parser;
use hfs_core::{NavigatorReport, SignalSource, Verdict};

/// Exit codes for the validate command
pub mod exit_codes {
    pub const ALLOW: i32 = 0;
    pub const WARN: i32 = 2;
    pub const BLOCK: i32 = 3;
}

#[derive(Debug, Parser)]
pub struct ValidateArgs {
    /// Path to a navigator report JSON
    #[arg(long)]
    report: PathBuf,

    /// Suppress the summary banner
    #[arg(long)]
    quiet: bool,
}

pub fn run(args: ValidateArgs) -> i32 {
    let raw = match std::fs::read_to_string(&args.report) {
        Ok(raw) => raw,
        Err(err) => {
            eprintln!(
                "validator: cannot read {}: {err}; failing safe",
                args.report.display()
            );
            return exit_codes::BLOCK;
        }
    };

    let report = match NavigatorReport::from_json_str(&raw) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("validator: unreadable report: {err}; failing safe");
            return exit_codes::BLOCK;
        }
    };

    if !args.quiet {
        print_banner(&report);
    }

    match report.verdict {
        Verdict::Allow => {
            eprintln!("validator: proceed");
            exit_codes::ALLOW
        }
        Verdict::Warn => {
            eprintln!("validator: warning band active");
            exit_codes::WARN
        }
        Verdict::Block => {
            eprintln!("validator: BLOCK active, stability at risk");
            exit_codes::BLOCK
        }
    }
}

fn print_banner(report: &NavigatorReport) {
    let baseline = SignalSource::baseline(report);
    eprintln!("======================================");
    eprintln!(" HFS Navigator Validation");
    eprintln!("======================================");
    eprintln!("Verdict        : {}", report.verdict);
    eprintln!(
        "Structural DNA : {}",
        report.dna.as_deref().unwrap_or("N/A")
    );
    eprintln!("Last Risk      : {:.4}", baseline.last_risk);
    eprintln!("Warn Threshold : {:.4}", baseline.warn_threshold);
    eprintln!("Block Threshold: {:.4}", baseline.block_threshold);
    eprintln!("--------------------------------------");
    if let Some(rec) = &report.recommendation {
        eprintln!("Recommendation : {rec}");
    }
    eprintln!("======================================");
}
