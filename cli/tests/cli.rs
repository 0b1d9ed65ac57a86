//! CLI integration tests.
//!
//! Each invocation pins `HFS_CONFIG` inside the test's tempdir so a
//! developer's real config can never leak into assertions.
//!
//! ## Exit codes under test
//! - `validate`: 0 ALLOW / 2 WARN / 3 BLOCK or unreadable (fail-safe)
//! - everything else: 0 success / 1 error

use std::path::{Path, PathBuf};

use anyhow::Result;
use predicates::prelude::*;
use serde_json::Value as JsonValue;
use tempfile::TempDir;

fn hfs_command(home: &Path) -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("hfs")?;
    // Point at a path that does not exist: the CLI then runs on defaults.
    cmd.env("HFS_CONFIG", home.join("hfs.toml"));
    Ok(cmd)
}

fn write_report(dir: &Path, name: &str, verdict: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let content = serde_json::json!({
        "kind": "HFS_NAVIGATOR_REPORT",
        "version": "0.1",
        "verdict": verdict,
        "dna": "T2 R1 P0 S1 C0 F1 W1 M0",
        "band": 4,
        "metrics_last_window": {"risk": 0.31, "specH": 0.42, "cusum": 0.05},
        "baseline": {"mu": 0.2, "sigma": 0.05, "warn_threshold": 0.3,
                     "block_threshold": 0.35, "last_risk": 0.31}
    });
    std::fs::write(&path, serde_json::to_string_pretty(&content)?)?;
    Ok(path)
}

// =============================================================================
// VALIDATE EXIT CODES
// =============================================================================

#[test]
fn validate_allow_exits_0() -> Result<()> {
    let dir = TempDir::new()?;
    let report = write_report(dir.path(), "report.json", "ALLOW")?;

    hfs_command(dir.path())?
        .args(["validate", "--report"])
        .arg(&report)
        .assert()
        .code(0)
        .stderr(predicate::str::contains("proceed"));
    Ok(())
}

#[test]
fn validate_warn_exits_2() -> Result<()> {
    let dir = TempDir::new()?;
    let report = write_report(dir.path(), "report.json", "WARN")?;

    hfs_command(dir.path())?
        .args(["validate", "--report"])
        .arg(&report)
        .assert()
        .code(2);
    Ok(())
}

#[test]
fn validate_block_exits_3() -> Result<()> {
    let dir = TempDir::new()?;
    let report = write_report(dir.path(), "report.json", "BLOCK")?;

    hfs_command(dir.path())?
        .args(["validate", "--report"])
        .arg(&report)
        .assert()
        .code(3);
    Ok(())
}

#[test]
fn validate_missing_report_fails_safe() -> Result<()> {
    let dir = TempDir::new()?;

    hfs_command(dir.path())?
        .args(["validate", "--report"])
        .arg(dir.path().join("no-such-report.json"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("failing safe"));
    Ok(())
}

#[test]
fn validate_unknown_verdict_fails_safe() -> Result<()> {
    let dir = TempDir::new()?;
    let report = write_report(dir.path(), "report.json", "MAYBE")?;

    hfs_command(dir.path())?
        .args(["validate", "--report"])
        .arg(&report)
        .assert()
        .code(3);
    Ok(())
}

#[test]
fn validate_junk_fails_safe() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("junk.json");
    std::fs::write(&path, "this is not json")?;

    hfs_command(dir.path())?
        .args(["validate", "--report"])
        .arg(&path)
        .assert()
        .code(3);
    Ok(())
}

// =============================================================================
// RUN
// =============================================================================

#[test]
fn run_emits_parseable_report() -> Result<()> {
    let dir = TempDir::new()?;

    let output = hfs_command(dir.path())?
        .args(["run", "--seed", "7", "--events", "80"])
        .output()?;
    assert!(output.status.success());

    let report: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["kind"], "HFS_NAVIGATOR_REPORT");
    assert!(report["verdict"].is_string());
    assert_eq!(report["meta"]["seed"], 7);
    assert_eq!(report["meta"]["window_size"], 20);
    Ok(())
}

#[test]
fn run_is_deterministic_per_seed() -> Result<()> {
    let dir = TempDir::new()?;

    let first = hfs_command(dir.path())?
        .args(["run", "--seed", "42", "--events", "120"])
        .output()?;
    let second = hfs_command(dir.path())?
        .args(["run", "--seed", "42", "--events", "120"])
        .output()?;
    assert!(first.status.success() && second.status.success());
    assert_eq!(first.stdout, second.stdout);

    let other = hfs_command(dir.path())?
        .args(["run", "--seed", "43", "--events", "120"])
        .output()?;
    assert!(other.status.success());
    assert_ne!(first.stdout, other.stdout);
    Ok(())
}

#[test]
fn run_dump_events_writes_jsonl() -> Result<()> {
    let dir = TempDir::new()?;
    let events_path = dir.path().join("events.jsonl");

    hfs_command(dir.path())?
        .args(["run", "--seed", "5", "--events", "40", "--dump-events"])
        .arg(&events_path)
        .assert()
        .code(0);

    let raw = std::fs::read_to_string(&events_path)?;
    let lines: Vec<&str> = raw.lines().collect();
    assert!(lines.len() >= 40, "messages plus bursts: {}", lines.len());
    for line in lines {
        let event: JsonValue = serde_json::from_str(line)?;
        assert!(event["t"].is_number());
        assert!(event["event"].is_string());
    }
    Ok(())
}

#[test]
fn run_report_feeds_validator() -> Result<()> {
    let dir = TempDir::new()?;
    let report_path = dir.path().join("report.json");

    hfs_command(dir.path())?
        .args(["run", "--seed", "42", "--events", "220", "--output"])
        .arg(&report_path)
        .assert()
        .code(0);

    let report: JsonValue = serde_json::from_str(&std::fs::read_to_string(&report_path)?)?;
    let expected = match report["verdict"].as_str() {
        Some("ALLOW") => 0,
        Some("WARN") => 2,
        _ => 3,
    };

    hfs_command(dir.path())?
        .args(["validate", "--quiet", "--report"])
        .arg(&report_path)
        .assert()
        .code(expected);
    Ok(())
}

// =============================================================================
// RECORD / QUERY / STATS / META
// =============================================================================

#[test]
fn record_query_stats_flow() -> Result<()> {
    let dir = TempDir::new()?;
    let report = write_report(dir.path(), "report.json", "WARN")?;
    let store = dir.path().join("memory.jsonl");

    // First observation inserts with strength 1.
    let output = hfs_command(dir.path())?
        .args(["record", "--repo", "demo", "--report"])
        .arg(&report)
        .arg("--store")
        .arg(&store)
        .output()?;
    assert!(output.status.success());
    let row: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(row["strength"], 1);
    assert_eq!(row["verdict"], "WARN");
    assert_eq!(row["context"]["repo"], "demo");

    // Re-observing the same signature merges and bumps strength.
    let output = hfs_command(dir.path())?
        .args(["record", "--report"])
        .arg(&report)
        .arg("--store")
        .arg(&store)
        .output()?;
    assert!(output.status.success());
    let row: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(row["strength"], 2);

    let output = hfs_command(dir.path())?
        .args(["query", "--verdict", "WARN", "--store"])
        .arg(&store)
        .output()?;
    assert!(output.status.success());
    let found: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(found["count"], 1);
    assert_eq!(found["items"][0]["strength"], 2);

    let output = hfs_command(dir.path())?
        .args(["query", "--min-strength", "99", "--store"])
        .arg(&store)
        .output()?;
    let found: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(found["count"], 0);

    let output = hfs_command(dir.path())?
        .args(["stats", "--store"])
        .arg(&store)
        .output()?;
    assert!(output.status.success());
    let stats: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(stats["count"], 1);
    assert_eq!(stats["strength_sum"], 2);
    Ok(())
}

#[test]
fn record_quiet_prints_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let report = write_report(dir.path(), "report.json", "ALLOW")?;
    let store = dir.path().join("memory.jsonl");

    hfs_command(dir.path())?
        .args(["record", "--quiet", "--report"])
        .arg(&report)
        .arg("--store")
        .arg(&store)
        .assert()
        .code(0)
        .stdout(predicate::str::is_empty());
    Ok(())
}

#[test]
fn record_missing_report_exits_1() -> Result<()> {
    let dir = TempDir::new()?;

    hfs_command(dir.path())?
        .args(["record", "--report"])
        .arg(dir.path().join("no-such.json"))
        .arg("--store")
        .arg(dir.path().join("memory.jsonl"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read report"));
    Ok(())
}

#[test]
fn meta_on_empty_store_is_neutral() -> Result<()> {
    let dir = TempDir::new()?;
    let report = write_report(dir.path(), "report.json", "WARN")?;
    let store = dir.path().join("memory.jsonl");

    let output = hfs_command(dir.path())?
        .args(["meta", "--report"])
        .arg(&report)
        .arg("--store")
        .arg(&store)
        .output()?;
    assert!(output.status.success());

    let patched: JsonValue = serde_json::from_slice(&output.stdout)?;
    assert_eq!(patched["meta"]["shrink"], 1.0);
    assert_eq!(patched["baseline"]["warn_threshold"], 0.3);
    assert_eq!(patched["baseline"]["block_threshold"], 0.35);
    Ok(())
}

#[test]
fn meta_with_blocked_history_shrinks_thresholds() -> Result<()> {
    let dir = TempDir::new()?;
    let warn_report = write_report(dir.path(), "report.json", "WARN")?;
    let block_report = write_report(dir.path(), "blocked.json", "BLOCK")?;
    let store = dir.path().join("memory.jsonl");

    // Record the same signature as BLOCK several times.
    for _ in 0..4 {
        hfs_command(dir.path())?
            .args(["record", "--quiet", "--report"])
            .arg(&block_report)
            .arg("--store")
            .arg(&store)
            .assert()
            .code(0);
    }

    let output = hfs_command(dir.path())?
        .args(["meta", "--report"])
        .arg(&warn_report)
        .arg("--store")
        .arg(&store)
        .output()?;
    assert!(output.status.success());

    let patched: JsonValue = serde_json::from_slice(&output.stdout)?;
    let shrink = patched["meta"]["shrink"].as_f64().expect("shrink present");
    assert!(shrink < 1.0, "blocked history must shrink: {shrink}");
    let warn = patched["baseline"]["warn_threshold"]
        .as_f64()
        .expect("warn threshold");
    assert!(warn < 0.3);
    Ok(())
}
