//! Events emitted by the discovery pipeline.
//!
//! Each event serializes to one `{ "type": ..., "data": ... }` message, the
//! shape streaming clients consume.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::Result;
use crate::models::ProfileRecord;

/// One item of the pipeline's output sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Progress message
    Log(String),
    /// An accepted profile
    Profile(ProfileRecord),
    /// A tag-scoped or fatal failure
    Error(String),
    /// Terminal marker, always last
    Complete(RunSummary),
}

impl Event {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log(message.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Message type tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Log(_) => "log",
            Event::Profile(_) => "profile",
            Event::Error(_) => "error",
            Event::Complete(_) => "complete",
        }
    }

    /// Build the wire message for this event.
    pub fn to_wire(&self) -> Result<WireMessage> {
        let data = match self {
            Event::Log(message) | Event::Error(message) => Value::String(message.clone()),
            Event::Profile(record) => serde_json::to_value(record)?,
            Event::Complete(summary) => Value::String(summary.message()),
        };
        Ok(WireMessage {
            kind: self.kind(),
            data,
        })
    }

    /// Serialize as a single JSON line.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_wire()?)?)
    }

    /// Frame as a server-sent-events message.
    pub fn to_sse_frame(&self) -> Result<String> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Complete(_))
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_wire()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

/// Serialized form of an [`Event`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub data: Value,
}

/// Totals for a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub profiles_found: usize,
    pub candidates_checked: usize,
    pub tags_scraped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn message(&self) -> String {
        format!("Search finished. Found {} profiles.", self.profiles_found)
    }

    /// Wall-clock duration of the run in seconds.
    pub fn elapsed_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}
