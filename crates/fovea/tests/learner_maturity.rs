//! The 25-turn maturity gate, exactly at the boundary.

use fovea_learn::{Learner, Maturity, TurnOutcome};

fn outcome(prompt: &str, file: &str) -> TurnOutcome {
    TurnOutcome {
        prompt: prompt.to_string(),
        files_injected: vec![file.to_string()],
        files_used: vec![file.to_string()],
    }
}

#[test]
fn twenty_four_turns_is_still_observing() {
    let mut learner = Learner::new();
    for _ in 0..24 {
        learner.observe(&outcome("scheduler stall", "src/sched.rs"));
    }
    assert_eq!(learner.maturity(), Maturity::Observing);
    assert!(learner.query("scheduler").is_empty());
}

#[test]
fn twenty_fifth_turn_flips_to_active() {
    let mut learner = Learner::new();
    for _ in 0..25 {
        learner.observe(&outcome("scheduler stall", "src/sched.rs"));
    }
    assert_eq!(learner.maturity(), Maturity::Active);

    let hits = learner.query("scheduler");
    assert_eq!(hits[0].0, "src/sched.rs");
}

#[test]
fn maturity_survives_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learned_state.json");

    let mut learner = Learner::new();
    for _ in 0..30 {
        learner.observe(&outcome("scheduler stall", "src/sched.rs"));
    }
    learner.save(&path).unwrap();

    let reloaded = Learner::load(&path);
    assert_eq!(reloaded.maturity(), Maturity::Active);
    assert_eq!(reloaded.turn_count(), 30);
    assert_eq!(reloaded.query("scheduler"), learner.query("scheduler"));
}

#[test]
fn observation_still_accumulates_while_gated() {
    let mut learner = Learner::new();
    for _ in 0..24 {
        learner.observe(&outcome("scheduler stall", "src/sched.rs"));
    }
    // the 25th turn both flips the gate and exposes everything recorded
    // during the observing phase
    learner.observe(&outcome("scheduler stall", "src/sched.rs"));

    let hits = learner.query("scheduler");
    assert!(
        hits[0].1 > 1.0,
        "strength should reflect all 25 observations: {}",
        hits[0].1
    );
}
