use chrono::{Duration, Utc};
use fovea_plugins::{BurnRate, Plugin, PluginCtx};
use fovea_store::{EventLog, FixedClock, Paths};
use serial_test::serial;

fn setup(dir: &std::path::Path) -> (Paths, EventLog) {
    std::env::set_var(fovea_store::HOME_ENV, dir);
    let paths = Paths::resolve(dir).unwrap();
    std::env::remove_var(fovea_store::HOME_ENV);
    (paths.clone(), EventLog::new(paths.events_log()))
}

fn write_stats(paths: &Paths, session_tokens: u64, quota_tokens: u64) {
    let stats = serde_json::json!({
        "sessionTokens": session_tokens,
        "quotaTokens": quota_tokens,
    });
    std::fs::create_dir_all(paths.home()).unwrap();
    std::fs::write(paths.usage_stats(), stats.to_string()).unwrap();
}

#[test]
#[serial]
fn no_stats_cache_means_silence() {
    let dir = tempfile::tempdir().unwrap();
    let (paths, events) = setup(dir.path());
    let clock = FixedClock::new(Utc::now());
    let ctx = PluginCtx::new(&paths, &clock, &events);

    let mut plugin = BurnRate::new();
    assert!(plugin.on_session_start(&ctx).unwrap().is_none());
    assert!(plugin.on_prompt_pre(&ctx, "hi").unwrap().is_none());
}

#[test]
#[serial]
fn slow_burn_never_warns() {
    let dir = tempfile::tempdir().unwrap();
    let (paths, events) = setup(dir.path());
    let clock = FixedClock::new(Utc::now());
    let ctx = PluginCtx::new(&paths, &clock, &events);

    let mut plugin = BurnRate::new();
    write_stats(&paths, 1_000, 1_000_000);
    plugin.on_session_start(&ctx).unwrap();

    for step in 1..=5 {
        clock.advance(Duration::minutes(1));
        write_stats(&paths, 1_000 + step * 100, 1_000_000);
        assert!(plugin.on_prompt_pre(&ctx, "work").unwrap().is_none());
    }
}

#[test]
#[serial]
fn fast_burn_warns_once_then_escalates_once() {
    let dir = tempfile::tempdir().unwrap();
    let (paths, events) = setup(dir.path());
    let clock = FixedClock::new(Utc::now());
    let ctx = PluginCtx::new(&paths, &clock, &events);

    let mut plugin = BurnRate::new();
    write_stats(&paths, 0, 50_000);
    plugin.on_session_start(&ctx).unwrap();

    // 2000 tokens/min against 48k remaining: ~24 min runway, below 30
    clock.advance(Duration::minutes(1));
    write_stats(&paths, 2_000, 50_000);
    let first = plugin.on_prompt_pre(&ctx, "a").unwrap();
    assert!(first.is_some(), "first crossing should warn");
    assert!(!first.unwrap().contains("CRITICAL"));

    // same regime: no repeat of the 30-minute warning
    clock.advance(Duration::minutes(1));
    write_stats(&paths, 4_000, 50_000);
    assert!(plugin.on_prompt_pre(&ctx, "b").unwrap().is_none());

    // burn accelerates: runway collapses under 10 minutes
    clock.advance(Duration::minutes(1));
    write_stats(&paths, 30_000, 50_000);
    let critical = plugin.on_prompt_pre(&ctx, "c").unwrap();
    assert!(critical.is_some());
    assert!(critical.unwrap().contains("CRITICAL"));

    // critical also fires only once
    clock.advance(Duration::minutes(1));
    write_stats(&paths, 32_000, 50_000);
    assert!(plugin.on_prompt_pre(&ctx, "d").unwrap().is_none());

    let records: Vec<fovea_store::EventRecord> =
        fovea_store::read_jsonl(&paths.events_log()).unwrap();
    assert_eq!(records.iter().filter(|r| r.kind == "quota_low").count(), 1);
    assert_eq!(
        records.iter().filter(|r| r.kind == "quota_critical").count(),
        1
    );
}
