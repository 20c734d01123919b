//! Router configuration: keyword map, thresholds, decay rates, pin/demote
//! lists. Loaded from `keywords.json` plus `router_overrides.json`;
//! malformed entries and unknown keys are skipped with a warning so one bad
//! line never takes the router down.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Content category, used for per-category decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Code,
    Prose,
    Markdown,
    Mixed,
}

impl Category {
    pub fn of_path(path: &str) -> Self {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "rs" | "py" | "js" | "jsx" | "ts" | "tsx" | "go" | "java" | "c" | "cc" | "cpp"
            | "h" | "hpp" | "sql" | "sh" => Category::Code,
            "md" | "markdown" => Category::Markdown,
            "txt" | "rst" | "adoc" => Category::Prose,
            _ => Category::Mixed,
        }
    }
}

/// Per-category score decay applied in Phase 1.
#[derive(Debug, Clone, PartialEq)]
pub struct DecayRates {
    pub code: f64,
    pub prose: f64,
    pub markdown: f64,
    pub mixed: f64,
}

impl Default for DecayRates {
    fn default() -> Self {
        Self {
            code: 0.85,
            prose: 0.70,
            markdown: 0.75,
            mixed: 0.80,
        }
    }
}

impl DecayRates {
    pub fn rate(&self, category: Category) -> f64 {
        match category {
            Category::Code => self.code,
            Category::Prose => self.prose,
            Category::Markdown => self.markdown,
            Category::Mixed => self.mixed,
        }
    }
}

/// One keyword rule: a case-insensitive word (or substring, when the
/// pattern carries non-alphanumeric characters) mapped to target files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordEntry {
    pub pattern: String,
    pub targets: Vec<String>,
    #[serde(default = "KeywordEntry::default_category")]
    pub category: Category,
    #[serde(default = "KeywordEntry::default_weight")]
    pub weight: f64,
}

impl KeywordEntry {
    fn default_category() -> Category {
        Category::Mixed
    }

    fn default_weight() -> f64 {
        1.0
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub hot_threshold: f64,
    pub warm_threshold: f64,
    pub max_hot: usize,
    pub max_warm: usize,
    pub max_context_chars: usize,
    pub hot_file_char_cap: usize,
    pub coactivation_boost: f64,
    pub transitive_boost: f64,
    pub learned_boost: f64,
    pub prewarm_boost: f64,
    pub prewarm_limit: usize,
    pub demoted_penalty: f64,
    pub pinned_floor_margin: f64,
    pub decay: DecayRates,
    pub keywords: Vec<KeywordEntry>,
    pub pinned: Vec<String>,
    pub demoted: Vec<String>,
    pub turn_budget_ms: u64,
    pub coactivation_budget_ms: u64,
    pub predictor_budget_ms: u64,
    /// category assigned by keyword entries, overriding the extension guess
    file_categories: HashMap<String, Category>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hot_threshold: 0.8,
            warm_threshold: 0.25,
            max_hot: 3,
            max_warm: 5,
            max_context_chars: 20_000,
            hot_file_char_cap: 8_000,
            coactivation_boost: 0.35,
            transitive_boost: 0.15,
            learned_boost: 0.35,
            prewarm_boost: 0.20,
            prewarm_limit: 5,
            demoted_penalty: 0.5,
            pinned_floor_margin: 0.01,
            decay: DecayRates::default(),
            keywords: Vec::new(),
            pinned: Vec::new(),
            demoted: Vec::new(),
            turn_budget_ms: 45,
            coactivation_budget_ms: 8,
            predictor_budget_ms: 5,
            file_categories: HashMap::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load keyword map and optional overrides. Missing files yield
    /// defaults; malformed pieces are skipped, never fatal.
    pub fn load(keywords_path: &Path, overrides_path: &Path) -> Self {
        let mut config = Self::default();
        config.load_keywords(keywords_path);
        config.load_overrides(overrides_path);
        config.reindex_categories();
        config
    }

    pub fn with_keywords(mut self, keywords: Vec<KeywordEntry>) -> Self {
        self.keywords = keywords;
        self.reindex_categories();
        self
    }

    pub fn is_pinned(&self, path: &str) -> bool {
        self.pinned.iter().any(|p| p == path)
    }

    pub fn is_demoted(&self, path: &str) -> bool {
        self.demoted.iter().any(|p| p == path)
    }

    /// Decay rate for a file: keyword-declared category wins over the
    /// extension guess.
    pub fn decay_for(&self, path: &str) -> f64 {
        let category = self
            .file_categories
            .get(path)
            .copied()
            .unwrap_or_else(|| Category::of_path(path));
        self.decay.rate(category)
    }

    pub fn pinned_floor(&self) -> f64 {
        self.warm_threshold + self.pinned_floor_margin
    }

    fn reindex_categories(&mut self) {
        self.file_categories.clear();
        for entry in &self.keywords {
            for target in &entry.targets {
                self.file_categories
                    .entry(target.clone())
                    .or_insert(entry.category);
            }
        }
    }

    fn load_keywords(&mut self, path: &Path) {
        let Some(raw) = read_json(path) else { return };
        let serde_json::Value::Array(items) = raw else {
            tracing::warn!(path = %path.display(), "keywords config is not an array, ignoring");
            return;
        };

        for item in items {
            match serde_json::from_value::<KeywordEntry>(item) {
                Ok(mut entry) => {
                    entry.pattern = entry.pattern.trim().to_lowercase();
                    if entry.pattern.is_empty() || entry.targets.is_empty() {
                        tracing::warn!("skipping keyword entry with empty pattern or targets");
                        continue;
                    }
                    if !(entry.weight > 0.0 && entry.weight <= 1.0) {
                        tracing::warn!(
                            pattern = %entry.pattern,
                            weight = entry.weight,
                            "skipping keyword entry with out-of-range weight"
                        );
                        continue;
                    }
                    self.keywords.push(entry);
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed keyword entry"),
            }
        }
    }

    fn load_overrides(&mut self, path: &Path) {
        let Some(raw) = read_json(path) else { return };
        let serde_json::Value::Object(map) = raw else {
            tracing::warn!(path = %path.display(), "overrides config is not an object, ignoring");
            return;
        };

        const KNOWN: &[&str] = &[
            "hot_threshold",
            "warm_threshold",
            "max_hot",
            "max_warm",
            "max_context_chars",
            "hot_file_char_cap",
            "demoted_penalty",
            "prewarm_limit",
            "decay_rates",
            "pinned",
            "demoted",
            "turn_budget_ms",
            "coactivation_budget_ms",
            "predictor_budget_ms",
        ];
        for key in map.keys() {
            if !KNOWN.contains(&key.as_str()) {
                tracing::warn!(key = %key, "ignoring unknown override key");
            }
        }

        #[derive(Deserialize)]
        struct DecayOverrides {
            code: Option<f64>,
            prose: Option<f64>,
            markdown: Option<f64>,
            mixed: Option<f64>,
        }

        #[derive(Deserialize)]
        struct Overrides {
            hot_threshold: Option<f64>,
            warm_threshold: Option<f64>,
            max_hot: Option<usize>,
            max_warm: Option<usize>,
            max_context_chars: Option<usize>,
            hot_file_char_cap: Option<usize>,
            demoted_penalty: Option<f64>,
            prewarm_limit: Option<usize>,
            decay_rates: Option<DecayOverrides>,
            pinned: Option<Vec<String>>,
            demoted: Option<Vec<String>>,
            turn_budget_ms: Option<u64>,
            coactivation_budget_ms: Option<u64>,
            predictor_budget_ms: Option<u64>,
        }

        let overrides: Overrides =
            match serde_json::from_value(serde_json::Value::Object(map)) {
                Ok(o) => o,
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring malformed overrides config");
                    return;
                }
            };

        macro_rules! apply {
            ($($field:ident),+) => {
                $(if let Some(v) = overrides.$field { self.$field = v; })+
            };
        }
        apply!(
            hot_threshold,
            warm_threshold,
            max_hot,
            max_warm,
            max_context_chars,
            hot_file_char_cap,
            demoted_penalty,
            prewarm_limit,
            pinned,
            demoted,
            turn_budget_ms,
            coactivation_budget_ms,
            predictor_budget_ms
        );
        if let Some(d) = overrides.decay_rates {
            if let Some(v) = d.code {
                self.decay.code = v;
            }
            if let Some(v) = d.prose {
                self.decay.prose = v;
            }
            if let Some(v) = d.markdown {
                self.decay.markdown = v;
            }
            if let Some(v) = d.mixed {
                self.decay.mixed = v;
            }
        }
    }
}

fn read_json(path: &Path) -> Option<serde_json::Value> {
    if !path.exists() {
        return None;
    }
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable config file");
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unparseable config file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.hot_threshold, 0.8);
        assert_eq!(config.warm_threshold, 0.25);
        assert_eq!(config.max_hot, 3);
        assert_eq!(config.max_warm, 5);
        assert_eq!(config.max_context_chars, 20_000);
        assert_eq!(config.decay.code, 0.85);
        assert_eq!(config.decay.prose, 0.70);
    }

    #[test]
    fn category_from_extension() {
        assert_eq!(Category::of_path("src/main.rs"), Category::Code);
        assert_eq!(Category::of_path("README.md"), Category::Markdown);
        assert_eq!(Category::of_path("notes.txt"), Category::Prose);
        assert_eq!(Category::of_path("data.bin"), Category::Mixed);
    }

    #[test]
    fn keyword_category_overrides_extension_decay() {
        let config = Config::default().with_keywords(vec![KeywordEntry {
            pattern: "spec".to_string(),
            targets: vec!["spec.bin".to_string()],
            category: Category::Markdown,
            weight: 1.0,
        }]);
        assert_eq!(config.decay_for("spec.bin"), 0.75);
        assert_eq!(config.decay_for("other.bin"), 0.80);
    }

    #[test]
    fn load_skips_malformed_keyword_entries() {
        let dir = tempfile::tempdir().unwrap();
        let keywords = dir.path().join("keywords.json");
        std::fs::write(
            &keywords,
            r#"[
                {"pattern": "lexer", "targets": ["src/lexer.rs"], "category": "code"},
                {"pattern": "", "targets": ["x.rs"]},
                {"targets": 12},
                {"pattern": "heavy", "targets": ["a.rs"], "weight": 3.5}
            ]"#,
        )
        .unwrap();

        let config = Config::load(&keywords, &dir.path().join("absent.json"));
        assert_eq!(config.keywords.len(), 1);
        assert_eq!(config.keywords[0].pattern, "lexer");
    }

    #[test]
    fn overrides_apply_and_unknown_keys_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = dir.path().join("router_overrides.json");
        std::fs::write(
            &overrides,
            r#"{
                "max_hot": 5,
                "pinned": ["CONTRACT.md"],
                "decay_rates": {"code": 0.9},
                "mystery_knob": true
            }"#,
        )
        .unwrap();

        let config = Config::load(&dir.path().join("absent.json"), &overrides);
        assert_eq!(config.max_hot, 5);
        assert_eq!(config.pinned, vec!["CONTRACT.md"]);
        assert_eq!(config.decay.code, 0.9);
        assert_eq!(config.decay.prose, 0.70);
    }

    #[test]
    fn missing_config_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(
            &dir.path().join("keywords.json"),
            &dir.path().join("router_overrides.json"),
        );
        assert!(config.keywords.is_empty());
        assert_eq!(config.max_hot, 3);
    }
}
