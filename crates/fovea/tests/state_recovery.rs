//! Crash-safety: committed state survives torn writes, corrupt files, and
//! version drift.

use fovea_core::{AttentionState, ATTN_STATE_VERSION};

#[test]
fn interrupted_write_leaves_committed_state_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attn_state.json");

    let mut state = AttentionState::new();
    state.scores.insert("src/router.rs".to_string(), 0.9);
    state.turn_count = 7;
    state.save(&path).unwrap();

    // a crash between temp-file write and rename leaves a partial temp
    // file next to the committed document
    std::fs::write(
        dir.path().join(".attn_state.json.tmp.4242"),
        format!("{{\"version\": {}, \"turn_count\": 8, \"scor", ATTN_STATE_VERSION),
    )
    .unwrap();

    let loaded = AttentionState::load(&path);
    assert_eq!(loaded.turn_count, 7);
    assert_eq!(loaded.scores.get("src/router.rs"), Some(&0.9));
}

#[test]
fn overwrite_is_all_or_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attn_state.json");

    let mut first = AttentionState::new();
    first.turn_count = 1;
    first.save(&path).unwrap();

    let mut second = AttentionState::new();
    second.turn_count = 2;
    second.scores.insert("a.rs".to_string(), 1.0);
    second.save(&path).unwrap();

    let loaded = AttentionState::load(&path);
    assert_eq!(loaded.turn_count, 2);
    assert_eq!(loaded.scores.get("a.rs"), Some(&1.0));
}

#[test]
fn corrupt_state_file_degrades_to_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attn_state.json");
    std::fs::write(&path, "not json at all").unwrap();

    let loaded = AttentionState::load(&path);
    assert_eq!(loaded.turn_count, 0);
    assert!(loaded.scores.is_empty());
}

#[test]
fn future_version_is_discarded_not_misread() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("attn_state.json");
    std::fs::write(
        &path,
        r#"{"version": 99, "turn_count": 50, "scores": {"x.rs": 4.0}, "streaks": {}}"#,
    )
    .unwrap();

    let loaded = AttentionState::load(&path);
    assert_eq!(loaded.turn_count, 0);
    assert!(loaded.scores.is_empty());
}
