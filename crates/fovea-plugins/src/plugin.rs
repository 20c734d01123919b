//! Plugin capability interface and per-plugin context.

use chrono::{DateTime, Utc};
use fovea_store::{Clock, EventLog, Paths};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// One observed tool call from the host assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    pub tool: String,
    #[serde(default)]
    pub target: Option<String>,
    /// operation payload: edit old-string, shell command line, write body
    #[serde(default)]
    pub op: Option<String>,
}

/// Everything the stop hook hands to plugins about a finished turn.
#[derive(Debug, Clone, Default)]
pub struct TurnEvents {
    pub tool_events: Vec<ToolEvent>,
    pub files_used: Vec<String>,
}

/// Routing outcome summary handed to `on_prompt_post`.
#[derive(Debug, Clone, Default)]
pub struct RoutingSummary {
    pub hot: Vec<String>,
    pub warm: Vec<String>,
    pub output_chars: usize,
}

/// Capabilities exposed to plugins: paths, time, the append-only event
/// log, and a typed handle to the plugin's private state document.
pub struct PluginCtx<'a> {
    paths: &'a Paths,
    clock: &'a dyn Clock,
    events: &'a EventLog,
}

impl<'a> PluginCtx<'a> {
    pub fn new(paths: &'a Paths, clock: &'a dyn Clock, events: &'a EventLog) -> Self {
        Self {
            paths,
            clock,
            events,
        }
    }

    pub fn paths(&self) -> &Paths {
        self.paths
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn log_event(&self, source: &str, kind: &str, message: &str) {
        self.events.append(self.clock, source, kind, message);
    }

    /// Load the plugin's private state; corrupt or absent documents read
    /// as default.
    pub fn load_state<T>(&self, plugin: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.paths.plugin_state(plugin);
        if !path.exists() {
            return T::default();
        }
        match std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|c| serde_json::from_str(&c).map_err(|e| e.to_string()))
        {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(plugin, error = %e, "resetting unreadable plugin state");
                T::default()
            }
        }
    }

    /// Atomically persist the plugin's private state.
    pub fn save_state<T: Serialize>(&self, plugin: &str, state: &T) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        fovea_store::atomic_write(&self.paths.plugin_state(plugin), json.as_bytes())?;
        Ok(())
    }

    /// Host assistant usage cache, for the burn-rate monitor.
    pub fn read_usage_stats(&self) -> Option<serde_json::Value> {
        let path = self.paths.usage_stats();
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// A plugin opts into hooks by overriding them; defaults are no-ops. A
/// hook returning `Err` disables the plugin for the rest of the process.
pub trait Plugin {
    fn name(&self) -> &'static str;

    fn on_session_start(&mut self, _ctx: &PluginCtx) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn on_prompt_pre(&mut self, _ctx: &PluginCtx, _prompt: &str) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn on_prompt_post(
        &mut self,
        _ctx: &PluginCtx,
        _prompt: &str,
        _routing: &RoutingSummary,
    ) -> anyhow::Result<Option<String>> {
        Ok(None)
    }

    fn on_stop(&mut self, _ctx: &PluginCtx, _turn: &TurnEvents) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}
