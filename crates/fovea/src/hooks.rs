//! Host hook protocol: one JSON event on stdin, one JSON reply on stdout.
//!
//! `session_start` seeds the attention state from the learned model,
//! `user_prompt_submit` runs the router on the latency path, and `stop`
//! does the deferred work: turn record, learner and predictor updates,
//! plugin stop hooks.

use anyhow::Context;
use fovea_core::{AttentionState, Config, RouteContext, Router};
use fovea_learn::{Learner, Predictor, TurnOutcome};
use fovea_plugins::{PluginCtx, RoutingSummary, Supervisor, ToolEvent, TurnEvents};
use fovea_store::{
    append_jsonl, estimate_tokens, read_jsonl, trim_prompt, Clock, EventLog, Paths, ProjectLock,
    SystemClock, TurnRecord,
};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

const LOCK_WAIT: Duration = Duration::from_millis(500);
const WARM_START_FILES: usize = 5;
const WARM_START_MARGIN: f64 = 0.05;

#[derive(Debug, Deserialize)]
struct HookInput {
    event: String,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    turn_id: Option<u64>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

/// Host tool calls arrive with tool-specific payload fields; collapse them
/// into the one op string the plugins care about.
#[derive(Debug, Deserialize)]
struct RawToolCall {
    tool: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    old_string: Option<String>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl From<RawToolCall> for ToolEvent {
    fn from(raw: RawToolCall) -> Self {
        ToolEvent {
            tool: raw.tool,
            target: raw.target,
            op: raw.old_string.or(raw.command).or(raw.content),
        }
    }
}

#[derive(Debug, Serialize)]
struct HookOutput {
    context: String,
    events: Vec<String>,
}

impl HookOutput {
    fn empty() -> Self {
        Self {
            context: String::new(),
            events: Vec::new(),
        }
    }
}

/// Prompt-hook facts the stop hook needs to close out the turn.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PendingTurn {
    turn_id: u64,
    prompt: String,
    files_injected: Vec<String>,
    token_estimate: usize,
}

/// Entry point for `fovea hook`. Returns the process exit code.
pub fn run() -> anyhow::Result<i32> {
    if std::env::var(fovea_store::DISABLE_ENV).is_ok_and(|v| v == "1") {
        emit(&HookOutput::empty())?;
        return Ok(0);
    }

    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;

    let input: HookInput = match serde_json::from_str(&raw) {
        Ok(input) => input,
        Err(e) => {
            eprintln!("fovea: bad hook input: {}", e);
            return Ok(2);
        }
    };

    match dispatch(input, &SystemClock) {
        Ok(output) => {
            emit(&output)?;
            Ok(0)
        }
        Err(e) => {
            eprintln!("fovea: {:#}", e);
            Ok(1)
        }
    }
}

fn emit(output: &HookOutput) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(output)?);
    Ok(())
}

fn dispatch(input: HookInput, clock: &dyn Clock) -> anyhow::Result<HookOutput> {
    let root: PathBuf = match &input.project_path {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let paths = Paths::resolve(&root).context("resolving project paths")?;
    paths.ensure_dirs().context("creating state directories")?;

    let event = input.event.clone();
    match event.as_str() {
        "session_start" => session_start(&paths, clock, &input),
        "user_prompt_submit" => prompt_submit(&paths, clock, &input),
        "stop" => stop(&paths, clock, input),
        other => anyhow::bail!("unknown hook event: {}", other),
    }
}

fn session_start(paths: &Paths, clock: &dyn Clock, input: &HookInput) -> anyhow::Result<HookOutput> {
    let _lock = ProjectLock::acquire(paths.lock_file(), LOCK_WAIT)?;

    let session_id = input
        .session_id
        .clone()
        .unwrap_or_else(|| format!("session-{}", clock.now().timestamp()));
    let session = serde_json::json!({
        "session_id": session_id,
        "started_at": clock.now().to_rfc3339(),
    });
    if let Err(e) = fovea_store::atomic_write(
        &paths.session_state(),
        serde_json::to_string_pretty(&session)?.as_bytes(),
    ) {
        tracing::warn!(error = %e, "failed to persist session state");
    }

    // Warm-start: seed historically useful files just above the warm
    // threshold so turn one already prefers them.
    let config = Config::load(&paths.keywords_config(), &paths.overrides_config());
    let learner = Learner::load(&paths.learned_state());
    let mut state = AttentionState::load(&paths.attn_state());
    for file in learner.warm_start(WARM_START_FILES) {
        state
            .scores
            .entry(file)
            .or_insert(config.warm_threshold + WARM_START_MARGIN);
    }
    if let Err(e) = state.save(&paths.attn_state()) {
        tracing::warn!(error = %e, "failed to persist warm-started attention state");
    }

    let events_log = EventLog::new(paths.events_log());
    let ctx = PluginCtx::new(paths, clock, &events_log);
    let mut supervisor = Supervisor::builtin(paths);
    let messages = supervisor.session_start(&ctx);

    Ok(HookOutput {
        context: String::new(),
        events: messages,
    })
}

fn prompt_submit(paths: &Paths, clock: &dyn Clock, input: &HookInput) -> anyhow::Result<HookOutput> {
    let prompt = input.prompt.clone().unwrap_or_default();
    let _lock = ProjectLock::acquire(paths.lock_file(), LOCK_WAIT)?;

    let config = Config::load(&paths.keywords_config(), &paths.overrides_config());
    let mut state = AttentionState::load(&paths.attn_state());
    let learner = Learner::load(&paths.learned_state());
    let predictor = load_or_rebuild_predictor(paths);

    let last_hot: Vec<String> = state
        .scores
        .iter()
        .filter(|(_, &score)| score >= config.hot_threshold)
        .map(|(path, _)| path.clone())
        .collect();

    let events_log = EventLog::new(paths.events_log());
    let plugin_ctx = PluginCtx::new(paths, clock, &events_log);
    let mut supervisor = Supervisor::builtin(paths);
    let mut advisories = supervisor.prompt_pre(&plugin_ctx, &prompt);

    let router = Router::new(config);
    let route_ctx = RouteContext {
        learner: Some(&learner),
        predictor: Some(&predictor),
        indexer: None,
        repo_map: None,
        last_hot,
        project_root: paths.project_root(),
    };
    let result = router.route(&mut state, &prompt, &route_ctx, clock.now());

    // Phase 8 commit point: a failed write is non-fatal, the next turn
    // reloads the previous committed state.
    if let Err(e) = state.save(&paths.attn_state()) {
        tracing::warn!(error = %e, "failed to persist attention state");
    }
    debug_assert!(state
        .scores
        .values()
        .all(|s| (0.0..=fovea_core::SCORE_MAX).contains(s)));

    let summary = RoutingSummary {
        hot: result.selection.hot.clone(),
        warm: result.selection.warm.clone(),
        output_chars: result.output.len(),
    };
    advisories.extend(supervisor.prompt_post(&plugin_ctx, &prompt, &summary));

    let mut files_injected = result.selection.hot.clone();
    files_injected.extend(result.selection.warm.iter().cloned());
    let pending = PendingTurn {
        turn_id: input.turn_id.unwrap_or(state.turn_count),
        prompt: prompt.clone(),
        files_injected,
        token_estimate: estimate_tokens(&result.output),
    };
    if let Err(e) = fovea_store::atomic_write(
        &paths.pending_turn(),
        serde_json::to_string(&pending)?.as_bytes(),
    ) {
        tracing::warn!(error = %e, "failed to persist pending turn");
    }

    Ok(HookOutput {
        context: result.output,
        events: advisories,
    })
}

fn stop(paths: &Paths, clock: &dyn Clock, input: HookInput) -> anyhow::Result<HookOutput> {
    let tool_events: Vec<ToolEvent> = input.tool_calls.into_iter().map(ToolEvent::from).collect();
    let files_used = files_from_tool_events(&tool_events);

    let _lock = ProjectLock::acquire(paths.lock_file(), LOCK_WAIT)?;

    let pending: PendingTurn = std::fs::read_to_string(paths.pending_turn())
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok())
        .unwrap_or_default();
    let _ = std::fs::remove_file(paths.pending_turn());

    let session_id = input
        .session_id
        .clone()
        .or_else(|| stored_session_id(paths))
        .unwrap_or_else(|| "unknown".to_string());

    // Load (or rebuild from the log) before this turn's record lands, so a
    // rebuild never counts the current turn twice.
    let mut predictor = load_or_rebuild_predictor(paths);

    let record = TurnRecord {
        turn_id: input.turn_id.unwrap_or(pending.turn_id),
        timestamp: clock.now(),
        project: paths.project_root().to_string_lossy().into_owned(),
        session_id,
        prompt_length: pending.prompt.len(),
        prompt_text: trim_prompt(&pending.prompt),
        files_injected: pending.files_injected.clone(),
        files_used: files_used.clone(),
        token_estimate: pending.token_estimate,
        notes: Vec::new(),
    };
    if let Err(e) = append_jsonl(&paths.turns_log(), &record) {
        tracing::warn!(error = %e, "failed to append turn record");
    }

    // Deferred learning, off the latency path.
    let mut learner = Learner::load(&paths.learned_state());
    learner.observe(&TurnOutcome {
        prompt: pending.prompt.clone(),
        files_injected: pending.files_injected,
        files_used: files_used.clone(),
    });
    if let Err(e) = learner.save(&paths.learned_state()) {
        tracing::warn!(error = %e, "failed to persist learned state");
    }

    let state = AttentionState::load(&paths.attn_state());
    let config = Config::load(&paths.keywords_config(), &paths.overrides_config());
    let hot_now: Vec<String> = state
        .scores
        .iter()
        .filter(|(_, &score)| score >= config.hot_threshold)
        .map(|(path, _)| path.clone())
        .collect();
    predictor.observe_turn(&pending.prompt, &files_used, &hot_now);
    if let Err(e) = predictor.save(&paths.predictor_model()) {
        tracing::warn!(error = %e, "failed to persist predictor model");
    }

    let events_log = EventLog::new(paths.events_log());
    let ctx = PluginCtx::new(paths, clock, &events_log);
    let mut supervisor = Supervisor::builtin(paths);
    let turn = TurnEvents {
        tool_events,
        files_used,
    };
    let messages = supervisor.stop(&ctx, &turn);

    Ok(HookOutput {
        context: String::new(),
        events: messages,
    })
}

/// Load the predictor, rebuilding from the turn log when the stored model
/// is absent or carries an incompatible version.
fn load_or_rebuild_predictor(paths: &Paths) -> Predictor {
    if let Some(predictor) = Predictor::load(&paths.predictor_model()) {
        return predictor;
    }

    let turns: Vec<TurnRecord> = read_jsonl(&paths.turns_log()).unwrap_or_default();
    if turns.is_empty() {
        return Predictor::new();
    }

    tracing::warn!(turns = turns.len(), "rebuilding predictor model from turn log");
    let mut predictor = Predictor::new();
    for turn in &turns {
        let prompt = turn.prompt_text.as_deref().unwrap_or("");
        predictor.observe_turn(prompt, &turn.files_used, &turn.files_used);
    }
    predictor
}

fn files_from_tool_events(events: &[ToolEvent]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for event in events {
        if let Some(target) = event.target.as_deref() {
            if !target.is_empty() {
                seen.insert(target.replace('\\', "/"));
            }
        }
    }
    seen.into_iter().collect()
}

fn stored_session_id(paths: &Paths) -> Option<String> {
    let content = std::fs::read_to_string(paths.session_state()).ok()?;
    let value: serde_json::Value = serde_json::from_str(&content).ok()?;
    value
        .get("session_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn input(event: &str, prompt: Option<&str>, project: &std::path::Path) -> HookInput {
        HookInput {
            event: event.to_string(),
            prompt: prompt.map(str::to_string),
            session_id: Some("sess-test".to_string()),
            project_path: Some(project.to_string_lossy().into_owned()),
            turn_id: None,
            tool_calls: Vec::new(),
        }
    }

    fn with_home<T>(f: impl FnOnce() -> T) -> T {
        let home = tempfile::tempdir().unwrap();
        std::env::set_var(fovea_store::HOME_ENV, home.path());
        let out = f();
        std::env::remove_var(fovea_store::HOME_ENV);
        out
    }

    #[test]
    #[serial]
    fn full_hook_cycle_produces_context_and_records_turn() {
        with_home(|| {
            let project = tempfile::tempdir().unwrap();
            std::fs::write(project.path().join("lexer.rs"), "fn lex() { /* ... */ }").unwrap();

            let clock = SystemClock;
            dispatch(input("session_start", None, project.path()), &clock).unwrap();

            let out = dispatch(
                input(
                    "user_prompt_submit",
                    Some("fix the parser bug in lexer.rs"),
                    project.path(),
                ),
                &clock,
            )
            .unwrap();
            assert!(out.context.contains("[HOT] lexer.rs"));
            assert!(out.context.contains("fn lex()"));

            let mut stop_input = input("stop", None, project.path());
            stop_input.tool_calls = vec![RawToolCall {
                tool: "Edit".to_string(),
                target: Some("lexer.rs".to_string()),
                old_string: Some("fn lex()".to_string()),
                command: None,
                content: None,
            }];
            dispatch(stop_input, &clock).unwrap();

            let paths = Paths::resolve(project.path()).unwrap();
            let turns: Vec<TurnRecord> = read_jsonl(&paths.turns_log()).unwrap();
            assert_eq!(turns.len(), 1);
            assert_eq!(turns[0].files_used, vec!["lexer.rs"]);
            assert!(turns[0].files_injected.contains(&"lexer.rs".to_string()));

            let learner = Learner::load(&paths.learned_state());
            assert_eq!(learner.turn_count(), 1);
        });
    }

    #[test]
    #[serial]
    fn cold_start_turn_counter_begins_at_one() {
        with_home(|| {
            let project = tempfile::tempdir().unwrap();
            let clock = SystemClock;

            dispatch(
                input("user_prompt_submit", Some("hello"), project.path()),
                &clock,
            )
            .unwrap();

            let paths = Paths::resolve(project.path()).unwrap();
            let state = AttentionState::load(&paths.attn_state());
            assert_eq!(state.turn_count, 1);
        });
    }

    #[test]
    #[serial]
    fn unknown_event_is_a_protocol_error() {
        with_home(|| {
            let project = tempfile::tempdir().unwrap();
            let result = dispatch(input("mystery", None, project.path()), &SystemClock);
            assert!(result.is_err());
        });
    }

    #[test]
    #[serial]
    fn warm_start_seeds_historically_useful_files() {
        with_home(|| {
            let project = tempfile::tempdir().unwrap();
            let paths = Paths::resolve(project.path()).unwrap();
            paths.ensure_dirs().unwrap();

            let mut learner = Learner::new();
            for _ in 0..10 {
                learner.observe(&TurnOutcome {
                    prompt: "core work".to_string(),
                    files_injected: vec!["src/core.rs".to_string()],
                    files_used: vec!["src/core.rs".to_string()],
                });
            }
            learner.save(&paths.learned_state()).unwrap();

            dispatch(input("session_start", None, project.path()), &SystemClock).unwrap();

            let state = AttentionState::load(&paths.attn_state());
            let seeded = state.scores.get("src/core.rs").copied().unwrap_or(0.0);
            assert!((seeded - 0.30).abs() < 1e-9, "seeded at warm+margin: {}", seeded);
        });
    }

    #[test]
    #[serial]
    fn tool_call_payload_collapses_to_op() {
        let raw = RawToolCall {
            tool: "Bash".to_string(),
            target: None,
            old_string: None,
            command: Some("cargo fmt".to_string()),
            content: None,
        };
        let event = ToolEvent::from(raw);
        assert_eq!(event.op.as_deref(), Some("cargo fmt"));
    }
}
