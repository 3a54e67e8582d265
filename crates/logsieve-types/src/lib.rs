//! Shared types for logsieve
//!
//! This crate contains data structures used across multiple logsieve crates.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Logger name used for synthetic records substituted for malformed payloads.
pub const SYSTEM_LOGGER: &str = "SYSTEM";

/// A single decoded log record.
///
/// Immutable once decoded; `highlighted` is a display flag owned by the
/// consumer layer and plays no part in filtering.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Producer timestamp, or receive time when the wire value was unusable
    pub timestamp: DateTime<Utc>,

    /// Level string as sent by the producer ("INFO", "Error", ...)
    pub level: String,

    /// Dot-separated logger name, e.g. "App.Db.Pool"
    pub logger: String,

    /// Message text; a non-empty wire `exception` is appended on a new line
    pub message: String,

    /// Message text up to the first line break, for one-line list display
    pub summary: String,

    /// Display flag toggled by the consumer layer
    pub highlighted: bool,
}

impl Record {
    /// Create a record stamped with the current time.
    pub fn new(
        level: impl Into<String>,
        logger: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        Self {
            timestamp: Utc::now(),
            level: level.into(),
            logger: logger.into(),
            summary: summarize(&message),
            message,
            highlighted: false,
        }
    }

    /// Create the synthetic ERROR record that stands in for a payload whose
    /// logger name was missing or empty.
    pub fn system(message: impl Into<String>) -> Self {
        Self::new("ERROR", SYSTEM_LOGGER, message)
    }
}

/// First line of a message, for one-line display.
pub fn summarize(message: &str) -> String {
    match message.find(['\n', '\r']) {
        Some(end) => message[..end].to_string(),
        None => message.to_string(),
    }
}

/// Enable state of a logger-tree node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NodeState {
    /// Node and every descendant are enabled
    #[default]
    Checked,
    /// Node and every descendant are disabled
    Unchecked,
    /// Descendants are mixed
    Indeterminate,
}

impl NodeState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }

    /// Short display string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checked => "checked",
            Self::Unchecked => "unchecked",
            Self::Indeterminate => "mixed",
        }
    }
}

/// Change notification pushed to the consumer layer.
///
/// Delivery is fire-and-forget over an unbounded channel; coalescing or
/// debouncing bursts is the consumer's job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A never-before-seen logger path was registered
    LoggerAdded(String),
    /// A tree node's enable state changed
    StateChanged { path: String, state: NodeState },
    /// A record was appended to the buffer
    RecordAppended(Record),
    /// The record buffer was emptied
    BufferCleared,
}
