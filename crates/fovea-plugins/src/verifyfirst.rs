//! VerifyFirst: read-before-write policy.
//!
//! Tracks the set of files read this session. A write or edit to a file
//! outside that set logs a violation; the next prompt carries an advisory
//! while violations are outstanding.

use crate::plugin::{Plugin, PluginCtx, TurnEvents};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const READ_TOOLS: &[&str] = &["Read", "read"];
const WRITE_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit", "edit", "write"];
const MAX_LISTED: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Violation {
    file: String,
    tool: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct VerifyState {
    files_read: HashSet<String>,
    violations: Vec<Violation>,
    /// how many violations the advisory has already covered
    advised: usize,
}

pub struct VerifyFirst;

impl VerifyFirst {
    pub fn new() -> Self {
        Self
    }

    fn normalize(path: &str) -> String {
        path.replace('\\', "/")
    }
}

impl Default for VerifyFirst {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for VerifyFirst {
    fn name(&self) -> &'static str {
        "verifyfirst"
    }

    fn on_session_start(&mut self, ctx: &PluginCtx) -> anyhow::Result<Option<String>> {
        // read-set is per-session
        ctx.save_state(self.name(), &VerifyState::default())?;
        Ok(Some("VerifyFirst: armed".to_string()))
    }

    fn on_prompt_pre(&mut self, ctx: &PluginCtx, _prompt: &str) -> anyhow::Result<Option<String>> {
        let mut state: VerifyState = ctx.load_state(self.name());
        if state.violations.len() <= state.advised {
            return Ok(None);
        }

        let fresh: Vec<&str> = state.violations[state.advised..]
            .iter()
            .take(MAX_LISTED)
            .map(|v| v.file.as_str())
            .collect();
        let advisory = format!(
            "verify_first: files were edited without being read first: {}. \
             Read a file before modifying it.",
            fresh.join(", ")
        );

        state.advised = state.violations.len();
        ctx.save_state(self.name(), &state)?;
        Ok(Some(advisory))
    }

    fn on_stop(&mut self, ctx: &PluginCtx, turn: &TurnEvents) -> anyhow::Result<Option<String>> {
        let mut state: VerifyState = ctx.load_state(self.name());
        let mut fresh = 0usize;

        for event in &turn.tool_events {
            let Some(target) = event.target.as_deref() else {
                continue;
            };
            let path = Self::normalize(target);

            if READ_TOOLS.contains(&event.tool.as_str()) {
                state.files_read.insert(path);
            } else if WRITE_TOOLS.contains(&event.tool.as_str())
                && !state.files_read.contains(&path)
            {
                ctx.log_event(
                    self.name(),
                    "violation",
                    &format!("{} on unread file {}", event.tool, path),
                );
                state.violations.push(Violation {
                    file: path,
                    tool: event.tool.clone(),
                });
                fresh += 1;
            }
        }

        ctx.save_state(self.name(), &state)?;
        if fresh > 0 {
            Ok(Some(format!(
                "[verifyfirst] {} write(s) to files never read",
                fresh
            )))
        } else {
            Ok(None)
        }
    }
}
