//! Dispatches lifecycle hooks across registered plugins.

use crate::plugin::{Plugin, PluginCtx, RoutingSummary, TurnEvents};
use fovea_store::Paths;

struct Entry {
    plugin: Box<dyn Plugin>,
    disabled: bool,
}

pub struct Supervisor {
    entries: Vec<Entry>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Built-in plugin set, honoring the enable map in `plugins.json`
    /// (`{"enabled": {"loopbreaker": false, ...}}`; absent means enabled).
    pub fn builtin(paths: &Paths) -> Self {
        let enabled = load_enabled_map(paths);
        let mut supervisor = Self::new();

        let all: Vec<Box<dyn Plugin>> = vec![
            Box::new(crate::LoopBreaker::new()),
            Box::new(crate::VerifyFirst::new()),
            Box::new(crate::BurnRate::new()),
        ];
        for plugin in all {
            let on = enabled
                .get(plugin.name())
                .copied()
                .unwrap_or(true);
            if on {
                supervisor.register(plugin);
            } else {
                tracing::debug!(plugin = plugin.name(), "disabled by config");
            }
        }
        supervisor
    }

    pub fn register(&mut self, plugin: Box<dyn Plugin>) {
        self.entries.push(Entry {
            plugin,
            disabled: false,
        });
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.disabled).count()
    }

    pub fn session_start(&mut self, ctx: &PluginCtx) -> Vec<String> {
        self.dispatch(ctx, |plugin, ctx| plugin.on_session_start(ctx))
    }

    pub fn prompt_pre(&mut self, ctx: &PluginCtx, prompt: &str) -> Vec<String> {
        self.dispatch(ctx, |plugin, ctx| plugin.on_prompt_pre(ctx, prompt))
    }

    pub fn prompt_post(
        &mut self,
        ctx: &PluginCtx,
        prompt: &str,
        routing: &RoutingSummary,
    ) -> Vec<String> {
        self.dispatch(ctx, |plugin, ctx| plugin.on_prompt_post(ctx, prompt, routing))
    }

    pub fn stop(&mut self, ctx: &PluginCtx, turn: &TurnEvents) -> Vec<String> {
        self.dispatch(ctx, |plugin, ctx| plugin.on_stop(ctx, turn))
    }

    /// Invoke a hook on every live plugin in registration order. A failing
    /// plugin is disabled for the rest of the process; the others continue.
    fn dispatch<F>(&mut self, ctx: &PluginCtx, mut hook: F) -> Vec<String>
    where
        F: FnMut(&mut dyn Plugin, &PluginCtx) -> anyhow::Result<Option<String>>,
    {
        let mut advisories = Vec::new();
        for entry in &mut self.entries {
            if entry.disabled {
                continue;
            }
            match hook(entry.plugin.as_mut(), ctx) {
                Ok(Some(advisory)) => advisories.push(advisory),
                Ok(None) => {}
                Err(e) => {
                    entry.disabled = true;
                    tracing::error!(plugin = entry.plugin.name(), error = %e, "plugin disabled");
                    ctx.log_event(
                        "supervisor",
                        "plugin_error",
                        &format!("{} disabled: {}", entry.plugin.name(), e),
                    );
                }
            }
        }
        advisories
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

fn load_enabled_map(paths: &Paths) -> std::collections::HashMap<String, bool> {
    let path = paths.plugins_config();
    if !path.exists() {
        return Default::default();
    }
    let parsed = std::fs::read_to_string(&path)
        .ok()
        .and_then(|c| serde_json::from_str::<serde_json::Value>(&c).ok());
    let Some(value) = parsed else {
        tracing::warn!(path = %path.display(), "unreadable plugins config, all plugins enabled");
        return Default::default();
    };

    value
        .get("enabled")
        .and_then(|e| e.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_bool().map(|b| (k.clone(), b)))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fovea_store::{EventLog, SystemClock};

    struct Echo {
        name: &'static str,
    }

    impl Plugin for Echo {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_prompt_pre(
            &mut self,
            _ctx: &PluginCtx,
            prompt: &str,
        ) -> anyhow::Result<Option<String>> {
            Ok(Some(format!("{} saw: {}", self.name, prompt)))
        }
    }

    struct Faulty {
        calls: usize,
    }

    impl Plugin for Faulty {
        fn name(&self) -> &'static str {
            "faulty"
        }

        fn on_prompt_pre(
            &mut self,
            _ctx: &PluginCtx,
            _prompt: &str,
        ) -> anyhow::Result<Option<String>> {
            self.calls += 1;
            anyhow::bail!("boom")
        }
    }

    fn test_ctx(dir: &std::path::Path) -> (Paths, EventLog) {
        std::env::set_var(fovea_store::HOME_ENV, dir);
        let paths = Paths::resolve(dir).unwrap();
        std::env::remove_var(fovea_store::HOME_ENV);
        let events = EventLog::new(paths.events_log());
        (paths, events)
    }

    #[test]
    #[serial_test::serial]
    fn advisories_collect_in_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, events) = test_ctx(dir.path());
        let ctx = PluginCtx::new(&paths, &SystemClock, &events);

        let mut supervisor = Supervisor::new();
        supervisor.register(Box::new(Echo { name: "one" }));
        supervisor.register(Box::new(Echo { name: "two" }));

        let advisories = supervisor.prompt_pre(&ctx, "hi");
        assert_eq!(advisories, vec!["one saw: hi", "two saw: hi"]);
    }

    #[test]
    #[serial_test::serial]
    fn failing_plugin_is_disabled_others_continue() {
        let dir = tempfile::tempdir().unwrap();
        let (paths, events) = test_ctx(dir.path());
        let ctx = PluginCtx::new(&paths, &SystemClock, &events);

        let mut supervisor = Supervisor::new();
        supervisor.register(Box::new(Faulty { calls: 0 }));
        supervisor.register(Box::new(Echo { name: "alive" }));

        let first = supervisor.prompt_pre(&ctx, "a");
        assert_eq!(first, vec!["alive saw: a"]);
        assert_eq!(supervisor.active_count(), 1);

        // second round does not re-invoke the disabled plugin
        let second = supervisor.prompt_pre(&ctx, "b");
        assert_eq!(second, vec!["alive saw: b"]);

        let records: Vec<fovea_store::EventRecord> =
            fovea_store::read_jsonl(&paths.events_log()).unwrap();
        assert!(records.iter().any(|r| r.kind == "plugin_error"));
    }
}
