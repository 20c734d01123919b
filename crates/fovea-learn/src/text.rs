//! Prompt tokenization shared by the learner, predictor, and router.

use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

static FILE_MENTION_RE: OnceLock<Regex> = OnceLock::new();

static STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "was", "were", "will", "would", "could", "should", "can", "may",
    "might", "this", "that", "these", "those", "with", "from", "into", "then", "than", "here",
    "there", "when", "where", "why", "how", "what", "which", "who", "all", "each", "some", "not",
    "only", "just", "but", "about", "its", "our", "your", "you", "they", "them", "has", "have",
    "had", "does", "did", "done", "been", "being", "also", "very", "too", "now", "new", "still",
    "please", "help", "want", "need", "like", "make", "take", "get", "let", "use", "see", "show",
    "tell", "give", "find", "look", "try", "run", "add", "remove", "change", "update", "check",
    "fix", "file", "code", "yes", "okay", "sure", "thanks", "thank",
];

/// Lowercase, split on non-alphanumerics (keeping `_` and `-` inside
/// tokens), drop short tokens and stop words.
pub fn tokenize(prompt: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    prompt
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|t| t.len() >= 3 && !stop.contains(t))
        .map(str::to_string)
        .collect()
}

/// Literal file mentions (`lexer.rs`, `docs/plan.md`) in a prompt.
pub fn file_mentions(prompt: &str) -> Vec<String> {
    let re = FILE_MENTION_RE.get_or_init(|| {
        Regex::new(
            r"\b[\w./-]+\.(?:rs|py|js|jsx|ts|tsx|go|java|c|cc|cpp|h|hpp|md|txt|json|yaml|yml|toml|html|css|sql|sh)\b",
        )
        .expect("file mention pattern is valid")
    });
    re.find_iter(prompt).map(|m| m.as_str().to_string()).collect()
}

/// Final path component, lowercased.
pub fn basename(path: &str) -> String {
    path.rsplit(['/', '\\'])
        .next()
        .unwrap_or(path)
        .to_lowercase()
}
