mod common;

use chrono::Utc;
use fovea_core::{AttentionState, Config, RouteContext, Router};

#[test]
fn cold_start_activates_mentioned_file() {
    let project = common::project_with_files(&[(
        "lexer.rs",
        "pub fn tokenize(input: &str) -> Vec<Token> {\n    todo!()\n}",
    )]);

    let router = Router::new(Config::default());
    let mut state = AttentionState::new();
    let ctx = RouteContext::new(project.path());

    let result = router.route(
        &mut state,
        "fix the parser bug in lexer.rs",
        &ctx,
        Utc::now(),
    );

    assert!(result.directly_activated.contains("lexer.rs"));
    assert_eq!(result.selection.hot, vec!["lexer.rs"]);
    assert!(result.output.contains("[HOT] lexer.rs"));
    assert!(result.output.contains("pub fn tokenize"));
    assert_eq!(state.turn_count, 1);
}

#[test]
fn cold_start_keyword_entry_activates_target() {
    let project = common::project_with_files(&[("src/parser.rs", "fn parse() {}")]);

    let config = common::config_with_keywords(vec![common::keyword("parser", "src/parser.rs")]);
    let router = Router::new(config);
    let mut state = AttentionState::new();
    let ctx = RouteContext::new(project.path());

    let result = router.route(&mut state, "the parser keeps failing", &ctx, Utc::now());

    assert!(result.directly_activated.contains("src/parser.rs"));
    assert_eq!(result.selection.hot, vec!["src/parser.rs"]);
    assert!(result.output.contains("fn parse()"));
}

#[test]
fn cold_start_with_no_signal_yields_empty_context() {
    let project = common::project_with_files(&[]);

    let router = Router::new(Config::default());
    let mut state = AttentionState::new();
    let ctx = RouteContext::new(project.path());

    let result = router.route(&mut state, "good morning", &ctx, Utc::now());

    assert!(result.directly_activated.is_empty());
    assert!(result.output.is_empty());
    assert_eq!(state.turn_count, 1);
}
