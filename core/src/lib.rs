//! HFS core: behavioral-signal scoring with persistent memory.
//!
//! This crate implements the full closed loop:
//! - Window metrics and convex risk over an event stream ([`signal`])
//! - Spectral instability and one-sided drift detection ([`spectral`], [`drift`])
//! - Warm-up baseline and verdict classification ([`navigator`])
//! - Behavioral signature and risk band encoding ([`dna`])
//! - Memory atoms with content-addressed identity ([`atom`], [`flower`])
//! - Append-only NDJSON store with upsert-merge ([`store`])
//! - History-informed threshold adaptation ([`meta`])
//!
//! [`session::score_events`] wires the pipeline end to end; the memory side
//! consumes any [`report::SignalSource`], not just this pipeline's reports.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod atom;
pub mod config;
pub mod dna;
pub mod drift;
pub mod errors;
pub mod event;
pub mod flower;
pub mod meta;
pub mod navigator;
pub mod report;
pub mod session;
pub mod signal;
pub mod spectral;
pub mod store;

pub use atom::{build_atom, MemoryAtom, PhaseZone, PrevSignals};
pub use config::HfsConfig;
pub use errors::{HfsError, Result};
pub use event::{Channel, EventFeatures, EventKind, HfsEvent};
pub use navigator::{Baseline, Verdict};
pub use report::{NavigatorReport, SignalSource};
pub use session::score_events;
pub use store::{MemoryQuery, MemoryStore, StoreStats, StoredAtom};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
