//! Turn and event records.

use crate::clock::Clock;
use crate::io::append_jsonl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Longest prompt excerpt persisted in a turn record.
const PROMPT_TEXT_LIMIT: usize = 500;

/// One request/response cycle with the host assistant, appended to
/// `turns.jsonl` by the stop hook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: u64,
    pub timestamp: DateTime<Utc>,
    pub project: String,
    pub session_id: String,
    pub prompt_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_text: Option<String>,
    #[serde(default)]
    pub files_injected: Vec<String>,
    #[serde(default)]
    pub files_used: Vec<String>,
    #[serde(default)]
    pub token_estimate: usize,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Trim a prompt for persistence, preserving char boundaries.
pub fn trim_prompt(prompt: &str) -> Option<String> {
    if prompt.is_empty() {
        return None;
    }
    let trimmed: String = prompt.chars().take(PROMPT_TEXT_LIMIT).collect();
    Some(trimmed)
}

/// Advisory/violation record appended to `events.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub kind: String,
    pub message: String,
}

/// Append-only event sink handed to plugins and the hook runtime.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Failures are logged and swallowed; event loss never fails a turn.
    pub fn append(&self, clock: &dyn Clock, source: &str, kind: &str, message: &str) {
        let record = EventRecord {
            timestamp: clock.now(),
            source: source.to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
        };
        if let Err(e) = append_jsonl(&self.path, &record) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append event");
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}
