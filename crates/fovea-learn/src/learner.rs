//! Post-turn affinity learner.
//!
//! Owns prompt-token associations (IDF-weighted at query time),
//! co-activation edges discovered from shared activation windows, per-file
//! revisit rhythms, and the maturity gate that keeps a young model from
//! influencing routing.

use crate::text::tokenize;
use fovea_store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

pub const LEARNED_STATE_VERSION: u64 = 2;

const MATURITY_TURNS: u64 = 25;
const ASSOCIATION_DECAY: f64 = 0.995;
const ASSOCIATION_EPSILON: f64 = 0.005;
const EDGE_DECAY: f64 = 0.995;
const EDGE_EPSILON: f64 = 0.005;
const EDGE_STEP: f64 = 0.1;
const JACCARD_THRESHOLD: f64 = 0.25;
const WINDOW_TURNS: u64 = 30;
const RHYTHM_ALPHA: f64 = 0.3;
const USEFULNESS_ALPHA: f64 = 0.3;
const INJECTED_UNUSED_PENALTY: f64 = -0.2;

/// Influence gate: a model younger than 25 turns records but returns
/// nothing on query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Maturity {
    Observing,
    Active,
}

/// EWMA of the gap (in turns) between successive activations of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rhythm {
    pub mean: f64,
    pub var: f64,
    pub last_turn: u64,
}

/// What the stop hook observed for one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub prompt: String,
    pub files_injected: Vec<String>,
    pub files_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "LearnedStateFile", from = "LearnedStateFile")]
pub struct Learner {
    turn_count: u64,
    /// token -> file -> strength
    associations: HashMap<String, HashMap<String, f64>>,
    /// token -> number of turns it appeared in
    doc_freq: HashMap<String, u64>,
    /// symmetric adjacency: file -> neighbor -> weight
    edges: HashMap<String, HashMap<String, f64>>,
    rhythms: HashMap<String, Rhythm>,
    /// EWMA of per-file usefulness, drives warm-start seeding
    usefulness: HashMap<String, f64>,
    /// activation turn ids inside the sliding window, per file
    windows: HashMap<String, VecDeque<u64>>,
}

impl Learner {
    pub fn new() -> Self {
        Self {
            turn_count: 0,
            associations: HashMap::new(),
            doc_freq: HashMap::new(),
            edges: HashMap::new(),
            rhythms: HashMap::new(),
            usefulness: HashMap::new(),
            windows: HashMap::new(),
        }
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    pub fn maturity(&self) -> Maturity {
        if self.turn_count >= MATURITY_TURNS {
            Maturity::Active
        } else {
            Maturity::Observing
        }
    }

    /// `log((1 + N) / (1 + df)) + 1` over observed turns.
    pub fn idf(&self, token: &str) -> f64 {
        let df = self.doc_freq.get(token).copied().unwrap_or(0);
        ((1.0 + self.turn_count as f64) / (1.0 + df as f64)).ln() + 1.0
    }

    /// Learned associations for one prompt token. Empty while observing.
    pub fn query(&self, token: &str) -> Vec<(String, f64)> {
        if self.maturity() == Maturity::Observing {
            return Vec::new();
        }
        let Some(files) = self.associations.get(token) else {
            return Vec::new();
        };
        let mut out: Vec<(String, f64)> = files.iter().map(|(f, &s)| (f.clone(), s)).collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out
    }

    /// Canonical (a < b) co-activation edges for the router's graph.
    pub fn coactivation_edges(&self) -> Vec<(String, String, f64)> {
        let mut out = Vec::new();
        for (a, neighbors) in &self.edges {
            for (b, &w) in neighbors {
                if a < b {
                    out.push((a.clone(), b.clone(), w));
                }
            }
        }
        out.sort_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));
        out
    }

    pub fn rhythm(&self, path: &str) -> Option<&Rhythm> {
        self.rhythms.get(path)
    }

    /// Top-k files by recent usefulness, for session warm-start seeding.
    pub fn warm_start(&self, top_k: usize) -> Vec<String> {
        let mut ranked: Vec<(&String, f64)> = self
            .usefulness
            .iter()
            .filter(|(_, &u)| u > 0.0)
            .map(|(f, &u)| (f, u))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked.into_iter().take(top_k).map(|(f, _)| f.clone()).collect()
    }

    /// Ingest one finished turn: associations, co-activation, rhythms.
    pub fn observe(&mut self, outcome: &TurnOutcome) {
        let turn = self.turn_count;
        let tokens: HashSet<String> = tokenize(&outcome.prompt).into_iter().collect();

        for token in &tokens {
            *self.doc_freq.entry(token.clone()).or_insert(0) += 1;
        }

        let injected: HashSet<&String> = outcome.files_injected.iter().collect();
        let used: HashSet<&String> = outcome.files_used.iter().collect();

        let mut per_file: HashMap<&String, f64> = HashMap::new();
        for &file in injected.union(&used) {
            let score = if used.contains(file) {
                // Used counts fully whether we injected it or the model
                // discovered it on its own.
                1.0
            } else {
                INJECTED_UNUSED_PENALTY
            };
            per_file.insert(file, score);
        }

        for token in &tokens {
            let idf = self.idf(token);
            let files = self.associations.entry(token.clone()).or_default();
            for (&file, &score) in &per_file {
                let strength = files.entry(file.clone()).or_insert(0.0);
                *strength += score * idf;
                if *strength <= 0.0 {
                    files.remove(file);
                }
            }
        }
        self.decay_associations();

        for &file in &used {
            self.touch_rhythm(file, turn);
            let window = self.windows.entry(file.clone()).or_default();
            window.push_back(turn);
            while window
                .front()
                .is_some_and(|&t| turn.saturating_sub(t) >= WINDOW_TURNS)
            {
                window.pop_front();
            }
        }

        for (&file, &score) in &per_file {
            let ewma = self.usefulness.entry(file.clone()).or_insert(0.0);
            *ewma = (1.0 - USEFULNESS_ALPHA) * *ewma + USEFULNESS_ALPHA * score;
        }

        self.update_edges(&outcome.files_used, turn);

        self.turn_count += 1;
    }

    fn decay_associations(&mut self) {
        for files in self.associations.values_mut() {
            files.retain(|_, strength| {
                *strength *= ASSOCIATION_DECAY;
                *strength >= ASSOCIATION_EPSILON
            });
        }
        self.associations.retain(|_, files| !files.is_empty());
    }

    fn touch_rhythm(&mut self, file: &str, turn: u64) {
        match self.rhythms.get_mut(file) {
            Some(rhythm) => {
                let gap = turn.saturating_sub(rhythm.last_turn) as f64;
                let delta = gap - rhythm.mean;
                rhythm.mean += RHYTHM_ALPHA * delta;
                rhythm.var = (1.0 - RHYTHM_ALPHA) * (rhythm.var + RHYTHM_ALPHA * delta * delta);
                rhythm.last_turn = turn;
            }
            None => {
                self.rhythms.insert(
                    file.to_string(),
                    Rhythm {
                        mean: 0.0,
                        var: 0.0,
                        last_turn: turn,
                    },
                );
            }
        }
    }

    fn update_edges(&mut self, files_used: &[String], turn: u64) {
        for neighbors in self.edges.values_mut() {
            neighbors.retain(|_, w| {
                *w *= EDGE_DECAY;
                *w >= EDGE_EPSILON
            });
        }
        self.edges.retain(|_, neighbors| !neighbors.is_empty());

        let unique: Vec<&String> = {
            let mut seen = HashSet::new();
            files_used.iter().filter(|f| seen.insert(*f)).collect()
        };

        for (i, &a) in unique.iter().enumerate() {
            for &b in unique.iter().skip(i + 1) {
                if a == b {
                    continue;
                }
                if self.window_jaccard(a, b, turn) >= JACCARD_THRESHOLD {
                    let w = self
                        .edges
                        .entry(a.clone())
                        .or_default()
                        .entry(b.clone())
                        .or_insert(0.0);
                    *w = (*w + EDGE_STEP).min(1.0);
                    let w = *w;
                    self.edges
                        .entry(b.clone())
                        .or_default()
                        .insert(a.clone(), w);
                }
            }
        }
    }

    fn window_jaccard(&self, a: &str, b: &str, turn: u64) -> f64 {
        let in_window = |file: &str| -> HashSet<u64> {
            self.windows
                .get(file)
                .map(|w| {
                    w.iter()
                        .copied()
                        .filter(|&t| turn.saturating_sub(t) < WINDOW_TURNS)
                        .collect()
                })
                .unwrap_or_default()
        };

        let wa = in_window(a);
        let wb = in_window(b);
        let union = wa.union(&wb).count();
        if union == 0 {
            return 0.0;
        }
        wa.intersection(&wb).count() as f64 / union as f64
    }

    /// Load prior state; corrupt or mismatched documents are discarded with
    /// a warning and the learner starts empty.
    pub fn load(path: &Path) -> Self {
        match fovea_store::load_versioned::<Self>(path, LEARNED_STATE_VERSION) {
            Ok(Some(learner)) => learner,
            Ok(None) => Self::new(),
            Err(e) => {
                tracing::warn!(error = %e, "discarding learned state, starting empty");
                Self::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        fovea_store::save_versioned(path, self)
    }
}

impl Default for Learner {
    fn default() -> Self {
        Self::new()
    }
}

/// On-disk layout: associations and co-activations as triple lists, edges
/// stored once per unordered pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LearnedStateFile {
    version: u64,
    turn_count: u64,
    associations: Vec<(String, String, f64)>,
    coactivations: Vec<(String, String, f64)>,
    rhythms: HashMap<String, Rhythm>,
    idf: HashMap<String, u64>,
    #[serde(default)]
    usefulness: HashMap<String, f64>,
    #[serde(default)]
    windows: HashMap<String, Vec<u64>>,
}

impl From<Learner> for LearnedStateFile {
    fn from(learner: Learner) -> Self {
        let mut associations: Vec<(String, String, f64)> = learner
            .associations
            .iter()
            .flat_map(|(t, files)| {
                files
                    .iter()
                    .map(move |(f, &s)| (t.clone(), f.clone(), s))
            })
            .collect();
        associations.sort_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));

        Self {
            version: LEARNED_STATE_VERSION,
            turn_count: learner.turn_count,
            coactivations: learner.coactivation_edges(),
            associations,
            rhythms: learner.rhythms,
            idf: learner.doc_freq,
            usefulness: learner.usefulness,
            windows: learner
                .windows
                .into_iter()
                .map(|(f, w)| (f, w.into_iter().collect()))
                .collect(),
        }
    }
}

impl From<LearnedStateFile> for Learner {
    fn from(file: LearnedStateFile) -> Self {
        let mut associations: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for (token, path, strength) in file.associations {
            associations.entry(token).or_default().insert(path, strength);
        }

        let mut edges: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for (a, b, w) in file.coactivations {
            edges.entry(a.clone()).or_default().insert(b.clone(), w);
            edges.entry(b).or_default().insert(a, w);
        }

        Self {
            turn_count: file.turn_count,
            associations,
            doc_freq: file.idf,
            edges,
            rhythms: file.rhythms,
            usefulness: file.usefulness,
            windows: file
                .windows
                .into_iter()
                .map(|(f, w)| (f, w.into_iter().collect()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(prompt: &str, used: &[&str]) -> TurnOutcome {
        TurnOutcome {
            prompt: prompt.to_string(),
            files_injected: used.iter().map(|s| s.to_string()).collect(),
            files_used: used.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn observing_learner_returns_nothing() {
        let mut learner = Learner::new();
        for _ in 0..10 {
            learner.observe(&outcome("parser crash", &["src/parser.rs"]));
        }
        assert_eq!(learner.maturity(), Maturity::Observing);
        assert!(learner.query("parser").is_empty());
    }

    #[test]
    fn active_learner_answers_queries() {
        let mut learner = Learner::new();
        for _ in 0..30 {
            learner.observe(&outcome("parser crash", &["src/parser.rs"]));
        }
        assert_eq!(learner.maturity(), Maturity::Active);

        let hits = learner.query("parser");
        assert_eq!(hits[0].0, "src/parser.rs");
        assert!(hits[0].1 > 0.0);
    }

    #[test]
    fn injected_unused_weakens_association() {
        let mut learner = Learner::new();
        for _ in 0..30 {
            learner.observe(&TurnOutcome {
                prompt: "tweak renderer".to_string(),
                files_injected: vec!["src/render.rs".to_string(), "src/audio.rs".to_string()],
                files_used: vec!["src/render.rs".to_string()],
            });
        }
        let hits = learner.query("renderer");
        let render = hits.iter().find(|(f, _)| f == "src/render.rs");
        let audio = hits.iter().find(|(f, _)| f == "src/audio.rs");
        assert!(render.is_some());
        assert!(audio.is_none(), "penalized file should prune to zero");
    }

    #[test]
    fn rare_tokens_carry_higher_idf() {
        let mut learner = Learner::new();
        for i in 0..40 {
            let prompt = if i % 20 == 0 {
                "quantizer glitch everywhere"
            } else {
                "glitch everywhere"
            };
            learner.observe(&outcome(prompt, &["src/dsp.rs"]));
        }
        assert!(learner.idf("quantizer") > learner.idf("glitch"));
    }

    #[test]
    fn coactivation_edge_forms_for_paired_files() {
        let mut learner = Learner::new();
        for _ in 0..6 {
            learner.observe(&outcome("wire the codec", &["src/codec.rs", "src/frame.rs"]));
        }
        let edges = learner.coactivation_edges();
        assert_eq!(edges.len(), 1);
        let (a, b, w) = &edges[0];
        assert_eq!((a.as_str(), b.as_str()), ("src/codec.rs", "src/frame.rs"));
        assert!(*w > 0.3, "six reinforcements should stack: {}", w);
    }

    #[test]
    fn no_edge_for_files_never_seen_together() {
        let mut learner = Learner::new();
        for i in 0..40 {
            let file = if i % 2 == 0 { "src/a.rs" } else { "src/b.rs" };
            learner.observe(&outcome("work", &[file]));
        }
        assert!(learner.coactivation_edges().is_empty());
    }

    #[test]
    fn unreinforced_edges_decay_away() {
        let mut learner = Learner::new();
        for _ in 0..4 {
            learner.observe(&outcome("pair work", &["src/x.rs", "src/y.rs"]));
        }
        assert!(!learner.coactivation_edges().is_empty());

        for _ in 0..900 {
            learner.observe(&outcome("other work", &["src/z.rs"]));
        }
        assert!(
            learner.coactivation_edges().is_empty(),
            "edges should decay below epsilon without reinforcement"
        );
    }

    #[test]
    fn rhythm_tracks_revisit_gap() {
        let mut learner = Learner::new();
        for i in 0..20 {
            let files: &[&str] = if i % 4 == 0 { &["src/cron.rs"] } else { &["src/other.rs"] };
            learner.observe(&outcome("tick", files));
        }
        let rhythm = learner.rhythm("src/cron.rs").unwrap();
        assert!(
            (rhythm.mean - 4.0).abs() < 1.5,
            "EWMA mean should approach the true gap of 4: {}",
            rhythm.mean
        );
    }

    #[test]
    fn warm_start_prefers_useful_files() {
        let mut learner = Learner::new();
        for _ in 0..10 {
            learner.observe(&outcome("main work", &["src/core.rs"]));
        }
        for _ in 0..2 {
            learner.observe(&outcome("side quest", &["src/minor.rs"]));
        }
        let seeds = learner.warm_start(1);
        assert_eq!(seeds, vec!["src/core.rs"]);
    }

    #[test]
    fn state_roundtrips_through_disk_format() {
        let mut learner = Learner::new();
        for _ in 0..30 {
            learner.observe(&outcome("codec frame sync", &["src/codec.rs", "src/frame.rs"]));
        }

        let json = serde_json::to_string(&learner).unwrap();
        let reloaded: Learner = serde_json::from_str(&json).unwrap();

        assert_eq!(reloaded.turn_count(), learner.turn_count());
        assert_eq!(reloaded.coactivation_edges(), learner.coactivation_edges());
        assert_eq!(reloaded.query("codec"), learner.query("codec"));
    }

    #[test]
    fn load_discards_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learned_state.json");
        std::fs::write(&path, r#"{"version": 1, "turn_count": 99}"#).unwrap();

        let learner = Learner::load(&path);
        assert_eq!(learner.turn_count(), 0);
    }
}
