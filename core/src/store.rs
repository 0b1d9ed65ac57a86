//! Durable memory store
//!
//! One NDJSON file holds the whole store: each mutating operation appends
//! the full merged row as a new line, and an in-memory index keyed by
//! crystallization key is rebuilt from the log on open with later lines
//! winning. When the log grows well past the live row count it is
//! compacted to one line per row via a temp file and atomic rename, so a
//! crash mid-rewrite can never truncate the store. Corrupt lines are
//! skipped on replay, never fatal; externally accumulated history must
//! stay usable despite partial corruption.
//!
//! Merge policy: identity fields (kind, crystal, dna_key) are frozen at
//! first insert; volatile fields (verdict, band, phase, signature,
//! metrics, baseline, atom_id, version) are replaced by the newest
//! snapshot; accumulators (strength, first/last-seen, context union,
//! flower area sum/max) move monotonically.

use crate::atom::MemoryAtom;
use crate::atom::PhaseZone;
use crate::config::StoreConfig;
use crate::errors::{HfsError, Result};
use crate::navigator::Verdict;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

/// Default maximum rows returned by a query
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// A memory atom plus store-owned bookkeeping; one JSON object per log line
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredAtom {
    #[serde(flatten)]
    pub atom: MemoryAtom,

    /// Observation counter; starts at 1 on insert
    #[serde(default = "default_strength")]
    pub strength: u32,

    /// Unix seconds of the first insert for this crystal
    #[serde(default)]
    pub first_seen: f64,

    /// Unix seconds of the latest merge
    #[serde(default)]
    pub last_seen: f64,

    /// Petal area accumulated across merges
    #[serde(default)]
    pub flower_area_sum: f64,

    /// Largest single petal area seen
    #[serde(default)]
    pub flower_area_max: f64,
}

fn default_strength() -> u32 {
    1
}

/// Filter for [`MemoryStore::query`]. Unset fields match everything.
/// `dna_key` (exact) takes precedence over `dna_contains` (substring).
#[derive(Clone, Debug)]
pub struct MemoryQuery {
    pub verdict: Option<Verdict>,
    pub band_min: Option<u8>,
    pub band_max: Option<u8>,
    pub phase_state: Option<u8>,
    pub crystal: Option<String>,
    pub dna_key: Option<String>,
    pub dna_contains: Option<String>,
    pub kind: Option<String>,
    pub min_strength: Option<u32>,
    pub limit: usize,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            verdict: None,
            band_min: None,
            band_max: None,
            phase_state: None,
            crystal: None,
            dna_key: None,
            dna_contains: None,
            kind: None,
            min_strength: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl MemoryQuery {
    fn matches(&self, row: &StoredAtom) -> bool {
        if let Some(kind) = &self.kind
            && row.atom.kind != *kind
        {
            return false;
        }
        if let Some(verdict) = self.verdict
            && row.atom.verdict != verdict
        {
            return false;
        }
        if let Some(min) = self.band_min
            && row.atom.band < min
        {
            return false;
        }
        if let Some(max) = self.band_max
            && row.atom.band > max
        {
            return false;
        }
        if let Some(state) = self.phase_state
            && row.atom.phase_state != state
        {
            return false;
        }
        if let Some(crystal) = &self.crystal
            && row.atom.crystal != *crystal
        {
            return false;
        }
        if let Some(key) = &self.dna_key {
            if row.atom.dna_key != *key {
                return false;
            }
        } else if let Some(needle) = &self.dna_contains
            && !row.atom.dna.contains(needle.as_str())
        {
            return false;
        }
        if let Some(min) = self.min_strength
            && row.strength < min
        {
            return false;
        }
        true
    }
}

/// Aggregate store statistics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub count: usize,
    pub strength_sum: u64,
    pub strength_max: u32,
    pub flower_area_sum: f64,
    pub flower_area_max: f64,
    pub zones: ZoneCounts,
}

/// Live rows per phase-state zone
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ZoneCounts {
    #[serde(rename = "Z1", default)]
    pub z1: u32,
    #[serde(rename = "Z2", default)]
    pub z2: u32,
    #[serde(rename = "Z3", default)]
    pub z3: u32,
    #[serde(rename = "Z4", default)]
    pub z4: u32,
}

/// Append-log memory store with an in-memory crystal-key index
pub struct MemoryStore {
    path: PathBuf,
    cfg: StoreConfig,
    index: BTreeMap<String, StoredAtom>,
    /// Non-empty lines currently in the log file (live + superseded + corrupt)
    log_lines: usize,
}

impl MemoryStore {
    /// Open a store, replaying the log into the index. A missing file is
    /// an empty store. Corrupt lines are counted and skipped.
    pub fn open(path: impl Into<PathBuf>, cfg: StoreConfig) -> Result<Self> {
        let path = path.into();
        let mut index = BTreeMap::new();
        let mut log_lines = 0usize;
        let mut skipped = 0usize;

        if path.exists() {
            let file = File::open(&path).map_err(|e| {
                HfsError::store_with_source(
                    format!("failed to open store at {}", path.display()),
                    e,
                )
            })?;
            for line in BufReader::new(file).lines() {
                let line = line.map_err(|e| {
                    HfsError::store_with_source(
                        format!("failed to read store at {}", path.display()),
                        e,
                    )
                })?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                log_lines += 1;
                match serde_json::from_str::<StoredAtom>(trimmed) {
                    Ok(row) => {
                        index.insert(row.atom.crystal.clone(), row);
                    }
                    Err(e) => {
                        skipped += 1;
                        tracing::debug!(error = %e, "skipping corrupt store line");
                    }
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(
                skipped,
                path = %path.display(),
                "skipped corrupt store lines during replay"
            );
        }

        Ok(Self {
            path,
            cfg,
            index,
            log_lines,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Look up the live row for a crystallization key
    pub fn get(&self, crystal: &str) -> Option<&StoredAtom> {
        self.index.get(crystal)
    }

    /// Iterate live rows in crystal-key order
    pub fn rows(&self) -> impl Iterator<Item = &StoredAtom> {
        self.index.values()
    }

    /// Merge an atom into the store by crystallization key.
    pub fn upsert(&mut self, atom: MemoryAtom) -> Result<StoredAtom> {
        self.upsert_at(atom, unix_now())
    }

    /// [`Self::upsert`] with an explicit clock, for deterministic tests.
    pub fn upsert_at(&mut self, atom: MemoryAtom, now: f64) -> Result<StoredAtom> {
        let petal = atom.flower.as_ref().map(|f| f.petal_area).unwrap_or(0.0);
        let bonus = if atom.flower.is_some() && petal >= self.cfg.flower_gate {
            self.cfg.flower_bonus
        } else {
            0
        };

        let merged = match self.index.get(&atom.crystal) {
            Some(existing) => {
                let mut row = existing.clone();
                row.strength = row.strength.saturating_add(1 + bonus);
                row.first_seen = row.first_seen.min(now);
                row.last_seen = row.last_seen.max(now);
                row.flower_area_sum += petal;
                row.flower_area_max = row.flower_area_max.max(petal);

                row.atom.version = atom.version;
                row.atom.atom_id = atom.atom_id;
                row.atom.verdict = atom.verdict;
                row.atom.dna = atom.dna;
                row.atom.band = atom.band;
                row.atom.phase_dir = atom.phase_dir;
                row.atom.phase_state = atom.phase_state;
                row.atom.baseline = atom.baseline;
                row.atom.metrics = atom.metrics;
                row.atom.flower = atom.flower;
                for (k, v) in atom.context {
                    row.atom.context.entry(k).or_insert(v);
                }
                row
            }
            None => StoredAtom {
                atom,
                strength: 1,
                first_seen: now,
                last_seen: now,
                flower_area_sum: petal,
                flower_area_max: petal,
            },
        };

        self.index.insert(merged.atom.crystal.clone(), merged.clone());
        self.append_line(&merged)?;
        self.maybe_compact()?;
        Ok(merged)
    }

    /// Raw non-merging write, kept for migration of legacy producers.
    /// The appended row replaces any live row for the same crystal, just
    /// as replaying the log would.
    pub fn append(&mut self, atom: MemoryAtom) -> Result<StoredAtom> {
        self.append_at(atom, unix_now())
    }

    /// [`Self::append`] with an explicit clock.
    pub fn append_at(&mut self, atom: MemoryAtom, now: f64) -> Result<StoredAtom> {
        let petal = atom.flower.as_ref().map(|f| f.petal_area).unwrap_or(0.0);
        let row = StoredAtom {
            atom,
            strength: 1,
            first_seen: now,
            last_seen: now,
            flower_area_sum: petal,
            flower_area_max: petal,
        };
        self.index.insert(row.atom.crystal.clone(), row.clone());
        self.append_line(&row)?;
        self.maybe_compact()?;
        Ok(row)
    }

    /// Filtered, ranked view of the live rows: descending by strength,
    /// then accumulated petal area, then last-seen, with crystal key as
    /// the final deterministic tiebreak.
    pub fn query(&self, q: &MemoryQuery) -> Vec<StoredAtom> {
        let mut rows: Vec<&StoredAtom> = self.index.values().filter(|r| q.matches(r)).collect();
        rows.sort_by(|a, b| {
            b.strength
                .cmp(&a.strength)
                .then_with(|| b.flower_area_sum.total_cmp(&a.flower_area_sum))
                .then_with(|| b.last_seen.total_cmp(&a.last_seen))
                .then_with(|| a.atom.crystal.cmp(&b.atom.crystal))
        });
        rows.into_iter().take(q.limit.max(1)).cloned().collect()
    }

    /// Aggregate statistics over the live rows
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats {
            count: self.index.len(),
            ..Default::default()
        };
        for row in self.index.values() {
            stats.strength_sum += u64::from(row.strength);
            stats.strength_max = stats.strength_max.max(row.strength);
            stats.flower_area_sum += row.flower_area_sum;
            stats.flower_area_max = stats.flower_area_max.max(row.flower_area_max);
            match PhaseZone::from_state(row.atom.phase_state) {
                PhaseZone::Z1 => stats.zones.z1 += 1,
                PhaseZone::Z2 => stats.zones.z2 += 1,
                PhaseZone::Z3 => stats.zones.z3 += 1,
                PhaseZone::Z4 => stats.zones.z4 += 1,
            }
        }
        stats
    }

    fn append_line(&mut self, row: &StoredAtom) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                HfsError::store_with_source(
                    format!("failed to create store directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                HfsError::store_with_source(
                    format!("failed to open store at {} for append", self.path.display()),
                    e,
                )
            })?;
        serde_json::to_writer(&mut file, row)
            .map_err(|e| HfsError::store_with_source("failed to encode store row", e))?;
        file.write_all(b"\n")
            .map_err(|e| HfsError::store_with_source("failed to append store row", e))?;

        self.log_lines += 1;
        Ok(())
    }

    fn maybe_compact(&mut self) -> Result<()> {
        if self.log_lines > self.cfg.compact_min_lines && self.log_lines >= self.index.len() * 2 {
            self.compact()?;
        }
        Ok(())
    }

    /// Rewrite the log to one line per live row. Writes to a temp file in
    /// the same directory, fsyncs, then atomically renames over the log.
    pub fn compact(&mut self) -> Result<()> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                HfsError::store(format!("invalid store path {}", self.path.display()))
            })?;
        let tmp_path = self.path.with_file_name(format!(".{file_name}.tmp"));

        let mut tmp = File::create(&tmp_path).map_err(|e| {
            HfsError::store_with_source(
                format!("failed to create temp file {}", tmp_path.display()),
                e,
            )
        })?;
        for row in self.index.values() {
            serde_json::to_writer(&mut tmp, row)
                .map_err(|e| HfsError::store_with_source("failed to encode store row", e))?;
            tmp.write_all(b"\n")
                .map_err(|e| HfsError::store_with_source("failed to write compacted store", e))?;
        }
        tmp.sync_all().map_err(|e| {
            HfsError::store_with_source("failed to sync compacted store", e)
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            HfsError::store_with_source(
                format!("failed to replace store at {}", self.path.display()),
                e,
            )
        })?;

        tracing::debug!(
            rows = self.index.len(),
            path = %self.path.display(),
            "compacted store log"
        );
        self.log_lines = self.index.len();
        Ok(())
    }
}

fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
