//! HFS configuration loading
//!
//! Loads configuration from `~/.config/hfs/hfs.toml` (or `HFS_CONFIG` env).
//! Every knob has a default, so an absent file yields a working config.
//! The risk formula weights are fixed by design and intentionally not
//! configurable; only window sizes, gates, and control bounds live here.

use crate::errors::{HfsError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Root configuration for the HFS scoring pipeline
#[derive(Debug, Deserialize, Clone)]
pub struct HfsConfig {
    /// Signal engine settings
    #[serde(default)]
    pub signal: SignalConfig,

    /// Navigator baseline/verdict settings
    #[serde(default)]
    pub navigator: NavigatorConfig,

    /// Signature and band encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,

    /// Memory atom builder settings
    #[serde(default)]
    pub atom: AtomConfig,

    /// Memory store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Meta-controller (threshold shrink) settings
    #[serde(default)]
    pub meta: MetaConfig,
}

/// Signal engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SignalConfig {
    /// Events per scoring window (non-overlapping; trailing partial kept)
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Trailing risk values fed to the spectral entropy estimate
    #[serde(default = "default_spectral_tail")]
    pub spectral_tail: usize,

    /// Minimum risk points before spectral entropy is meaningful
    #[serde(default = "default_spectral_min_points")]
    pub spectral_min_points: usize,

    /// CUSUM drift sensitivity (slack subtracted per step)
    #[serde(default = "default_cusum_k")]
    pub cusum_k: f64,

    /// CUSUM alarm threshold
    #[serde(default = "default_cusum_h")]
    pub cusum_h: f64,

    /// Minimum risk points before the CUSUM test applies
    #[serde(default = "default_cusum_min_points")]
    pub cusum_min_points: usize,
}

fn default_window_size() -> usize {
    20
}
fn default_spectral_tail() -> usize {
    32
}
fn default_spectral_min_points() -> usize {
    8
}
fn default_cusum_k() -> f64 {
    0.02
}
fn default_cusum_h() -> f64 {
    0.15
}
fn default_cusum_min_points() -> usize {
    10
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            spectral_tail: default_spectral_tail(),
            spectral_min_points: default_spectral_min_points(),
            cusum_k: default_cusum_k(),
            cusum_h: default_cusum_h(),
            cusum_min_points: default_cusum_min_points(),
        }
    }
}

/// Navigator configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NavigatorConfig {
    /// Fraction of the risk series used as the warm-up prefix
    #[serde(default = "default_warmup_fraction")]
    pub warmup_fraction: f64,

    /// Sigma multiple for the WARN threshold
    #[serde(default = "default_warn_sigma")]
    pub warn_sigma: f64,

    /// Sigma multiple for the BLOCK threshold
    #[serde(default = "default_block_sigma")]
    pub block_sigma: f64,
}

fn default_warmup_fraction() -> f64 {
    0.60
}
fn default_warn_sigma() -> f64 {
    2.0
}
fn default_block_sigma() -> f64 {
    3.0
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            warmup_fraction: default_warmup_fraction(),
            warn_sigma: default_warn_sigma(),
            block_sigma: default_block_sigma(),
        }
    }
}

/// Signature ("DNA") and band encoder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EncoderConfig {
    /// Level cut points for discretizing a 0..1 metric into 0..3
    #[serde(default = "default_level_cuts")]
    pub level_cuts: [f64; 3],

    /// How many leading tokens form the signature key
    #[serde(default = "default_key_len")]
    pub key_len: usize,
}

fn default_level_cuts() -> [f64; 3] {
    [0.15, 0.35, 0.60]
}
fn default_key_len() -> usize {
    3
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            level_cuts: default_level_cuts(),
            key_len: default_key_len(),
        }
    }
}

/// Memory atom builder configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AtomConfig {
    /// |Δcusum| above this gate forces a shadow phase direction
    #[serde(default = "default_cusum_gate")]
    pub cusum_gate: f64,
}

fn default_cusum_gate() -> f64 {
    0.05
}

impl Default for AtomConfig {
    fn default() -> Self {
        Self {
            cusum_gate: default_cusum_gate(),
        }
    }
}

/// Memory store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Petal area at or above this gate earns bonus strength on merge
    #[serde(default = "default_flower_gate")]
    pub flower_gate: f64,

    /// Bonus strength added when the flower gate is met
    #[serde(default = "default_flower_bonus")]
    pub flower_bonus: u32,

    /// Log lines below which compaction is never attempted
    #[serde(default = "default_compact_min_lines")]
    pub compact_min_lines: usize,
}

fn default_flower_gate() -> f64 {
    0.01
}
fn default_flower_bonus() -> u32 {
    1
}
fn default_compact_min_lines() -> usize {
    512
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            flower_gate: default_flower_gate(),
            flower_bonus: default_flower_bonus(),
            compact_min_lines: default_compact_min_lines(),
        }
    }
}

/// Meta-controller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MetaConfig {
    /// Maximum historical rows consulted per decision
    #[serde(default = "default_lookback")]
    pub lookback: usize,

    /// Observations (total strength) below which shrink stays 1.0
    #[serde(default = "default_min_matches")]
    pub min_matches: u32,

    /// Upper bound on threshold shrinkage; shrink stays in [1 - max_shrink, 1]
    #[serde(default = "default_max_shrink")]
    pub max_shrink: f64,

    /// Reflex weight for the historical BLOCK rate
    #[serde(default = "default_block_weight")]
    pub block_weight: f64,

    /// Reflex weight for average band hotness ((7 - band) / 6)
    #[serde(default = "default_band_weight")]
    pub band_weight: f64,

    /// Minimum Jaccard similarity over signature tokens for a fuzzy match
    #[serde(default = "default_jaccard_min")]
    pub jaccard_min: f64,
}

fn default_lookback() -> usize {
    200
}
fn default_min_matches() -> u32 {
    3
}
fn default_max_shrink() -> f64 {
    0.35
}
fn default_block_weight() -> f64 {
    0.6
}
fn default_band_weight() -> f64 {
    0.4
}
fn default_jaccard_min() -> f64 {
    0.5
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            min_matches: default_min_matches(),
            max_shrink: default_max_shrink(),
            block_weight: default_block_weight(),
            band_weight: default_band_weight(),
            jaccard_min: default_jaccard_min(),
        }
    }
}

impl Default for HfsConfig {
    fn default() -> Self {
        Self {
            signal: SignalConfig::default(),
            navigator: NavigatorConfig::default(),
            encoder: EncoderConfig::default(),
            atom: AtomConfig::default(),
            store: StoreConfig::default(),
            meta: MetaConfig::default(),
        }
    }
}

impl HfsConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "HFS_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "hfs.toml";

    /// Load configuration.
    ///
    /// Resolution order:
    /// 1. explicit `path` argument
    /// 2. `HFS_CONFIG` environment variable
    /// 3. `~/.config/hfs/hfs.toml`
    ///
    /// A missing file yields the default configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::resolve_config_path(),
        };

        if !path.exists() {
            tracing::debug!(
                path = %path.display(),
                "HFS config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            HfsError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: HfsConfig = toml::from_str(contents)
            .map_err(|e| HfsError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve the configuration file path
    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("hfs")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Validate configuration, rejecting values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.signal.window_size == 0 {
            return Err(HfsError::config("signal.window_size must be >= 1"));
        }

        if !(self.navigator.warmup_fraction > 0.0 && self.navigator.warmup_fraction <= 1.0) {
            return Err(HfsError::config(
                "navigator.warmup_fraction must be in (0, 1]",
            ));
        }

        let [a, b, c] = self.encoder.level_cuts;
        if !(a < b && b < c) {
            return Err(HfsError::config(
                "encoder.level_cuts must be strictly increasing",
            ));
        }

        if self.encoder.key_len == 0 {
            return Err(HfsError::config("encoder.key_len must be >= 1"));
        }

        if !(0.0..1.0).contains(&self.meta.max_shrink) {
            return Err(HfsError::config("meta.max_shrink must be in [0, 1)"));
        }

        if self.signal.cusum_h <= self.signal.cusum_k {
            tracing::warn!(
                cusum_h = self.signal.cusum_h,
                cusum_k = self.signal.cusum_k,
                "cusum_h <= cusum_k, drift alarm will fire on almost any series"
            );
        }

        let weight_sum = self.meta.block_weight + self.meta.band_weight;
        if (weight_sum - 1.0).abs() > 0.01 {
            tracing::warn!(
                weight_sum,
                "meta reflex weights don't sum to 1.0, shrink may saturate early"
            );
        }

        Ok(())
    }
}
