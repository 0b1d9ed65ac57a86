//! Behavioral event model
//!
//! Events are produced by an external source (live telemetry or the
//! synthetic simulator) and are immutable once constructed; the scoring
//! pipeline only ever reads them. The JSON shape matches the event dump
//! format (`hfs run --dump-events`), one object per line.

use serde::{Deserialize, Serialize};

/// Where an event originated
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Conversational message stream
    Chat,
    /// Editor activity stream
    Ide,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Ide => "ide",
        }
    }
}

/// What kind of activity an event records
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A full message; carries the complete feature set
    Message,
    /// An edit burst; only `edits` is meaningful
    Edit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Edit => "edit",
        }
    }
}

/// Numeric features attached to an event.
///
/// Edit events populate only `edits`; the remaining fields default to zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFeatures {
    /// Message length in characters
    #[serde(default)]
    pub len: u32,

    /// Pause before this event, seconds
    #[serde(default)]
    pub pause_s: f64,

    /// Edit/rewrite count attributed to this event
    #[serde(default)]
    pub edits: u32,

    /// Structured-writing score in [0, 1]
    #[serde(default)]
    pub structure: f64,

    /// Contradiction flag (0 or 1)
    #[serde(default)]
    pub contradiction: f64,
}

/// One behavioral event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HfsEvent {
    /// Event timestamp, unix seconds
    pub t: f64,

    /// Originating channel
    pub channel: Channel,

    /// Activity kind
    #[serde(rename = "event")]
    pub kind: EventKind,

    /// Topic label at the time of the event
    pub topic: String,

    /// Numeric features
    pub features: EventFeatures,
}
