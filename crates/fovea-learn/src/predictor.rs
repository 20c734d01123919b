//! Pre-warm predictor.
//!
//! Dual-mode: confident when the prompt carries explicit evidence (a file
//! basename, a strong keyword, a Markov transition from the last hot set),
//! fallback to recency + co-occurrence + popularity otherwise. Updated
//! post-turn; queried synchronously by the router's Phase 7.

use crate::text::{basename, file_mentions, tokenize};
use fovea_store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const PREDICTOR_MODEL_VERSION: u64 = 2;

const STRONG_KEYWORD_IDF: f64 = 3.0;
const MARKOV_THRESHOLD: f64 = 0.3;
const MENTION_CONFIDENCE: f64 = 0.9;
const KEYWORD_CONFIDENCE: f64 = 0.7;
const FALLBACK_CAP: f64 = 0.4;
const RECENCY_TAU: f64 = 5.0;
const RECENCY_WEIGHT: f64 = 0.5;
const COOCCURRENCE_WEIGHT: f64 = 0.3;
const POPULARITY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictMode {
    Confident,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub file: String,
    pub confidence: f64,
    pub mode: PredictMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predictor {
    version: u64,
    turn_count: u64,
    /// prompt mentions that resolved to a known file
    mention_counts: HashMap<String, u64>,
    /// token -> files active on turns the token appeared
    token_files: HashMap<String, HashSet<String>>,
    token_df: HashMap<String, u64>,
    /// Markov transition counts: hot file on turn N -> active file on turn N+1
    transitions: HashMap<String, HashMap<String, u64>>,
    /// same-turn co-occurrence counts
    cooccurrence: HashMap<String, HashMap<String, u64>>,
    popularity: HashMap<String, u64>,
    last_seen: HashMap<String, u64>,
    /// hot set of the previously observed turn (transition source)
    prev_hot: Vec<String>,
    /// basename -> full paths
    names: HashMap<String, Vec<String>>,
}

impl Predictor {
    pub fn new() -> Self {
        Self {
            version: PREDICTOR_MODEL_VERSION,
            turn_count: 0,
            mention_counts: HashMap::new(),
            token_files: HashMap::new(),
            token_df: HashMap::new(),
            transitions: HashMap::new(),
            cooccurrence: HashMap::new(),
            popularity: HashMap::new(),
            last_seen: HashMap::new(),
            prev_hot: Vec::new(),
            names: HashMap::new(),
        }
    }

    pub fn turn_count(&self) -> u64 {
        self.turn_count
    }

    fn idf(&self, token: &str) -> f64 {
        let df = self.token_df.get(token).copied().unwrap_or(0);
        ((1.0 + self.turn_count as f64) / (1.0 + df as f64)).ln() + 1.0
    }

    /// Ingest one finished turn. `hot_files` becomes the transition source
    /// for the next turn.
    pub fn observe_turn(&mut self, prompt: &str, files_active: &[String], hot_files: &[String]) {
        let turn = self.turn_count;

        for mention in file_mentions(prompt) {
            for path in self.resolve_mention(&mention) {
                *self.mention_counts.entry(path).or_insert(0) += 1;
            }
        }

        let tokens: HashSet<String> = tokenize(prompt).into_iter().collect();
        for token in tokens {
            *self.token_df.entry(token.clone()).or_insert(0) += 1;
            self.token_files
                .entry(token)
                .or_default()
                .extend(files_active.iter().cloned());
        }

        for file in files_active {
            *self.popularity.entry(file.clone()).or_insert(0) += 1;
            self.last_seen.insert(file.clone(), turn);
            let name = basename(file);
            let paths = self.names.entry(name).or_default();
            if !paths.contains(file) {
                paths.push(file.clone());
            }
        }

        for (i, a) in files_active.iter().enumerate() {
            for b in files_active.iter().skip(i + 1) {
                if a == b {
                    continue;
                }
                *self
                    .cooccurrence
                    .entry(a.clone())
                    .or_default()
                    .entry(b.clone())
                    .or_insert(0) += 1;
                *self
                    .cooccurrence
                    .entry(b.clone())
                    .or_default()
                    .entry(a.clone())
                    .or_insert(0) += 1;
            }
        }

        let prev = std::mem::replace(&mut self.prev_hot, hot_files.to_vec());
        for source in prev {
            let row = self.transitions.entry(source).or_default();
            for file in files_active {
                *row.entry(file.clone()).or_insert(0) += 1;
            }
        }

        self.turn_count += 1;
    }

    fn resolve_mention(&self, mention: &str) -> Vec<String> {
        if self.popularity.contains_key(mention) {
            return vec![mention.to_string()];
        }
        self.names
            .get(&basename(mention))
            .cloned()
            .unwrap_or_default()
    }

    /// Ranked pre-warm candidates for the coming turn.
    pub fn predict(&self, prompt: &str, last_hot: &[String]) -> Vec<Prediction> {
        let mut confident: HashMap<String, f64> = HashMap::new();

        for mention in file_mentions(prompt) {
            for path in self.resolve_mention(&mention) {
                merge_max(&mut confident, path, MENTION_CONFIDENCE);
            }
        }

        for token in tokenize(prompt) {
            if self.idf(&token) < STRONG_KEYWORD_IDF {
                continue;
            }
            if let Some(files) = self.token_files.get(&token) {
                if files.len() == 1 {
                    let file = files.iter().next().cloned().unwrap_or_default();
                    merge_max(&mut confident, file, KEYWORD_CONFIDENCE);
                }
            }
        }

        for source in last_hot {
            let Some(row) = self.transitions.get(source) else {
                continue;
            };
            let total: u64 = row.values().sum();
            if total == 0 {
                continue;
            }
            for (file, &count) in row {
                let p = count as f64 / total as f64;
                if p > MARKOV_THRESHOLD {
                    merge_max(&mut confident, file.clone(), p);
                }
            }
        }

        if !confident.is_empty() {
            return ranked(confident, PredictMode::Confident);
        }

        self.predict_fallback(last_hot)
    }

    fn predict_fallback(&self, last_hot: &[String]) -> Vec<Prediction> {
        let max_pop = self.popularity.values().max().copied().unwrap_or(0);
        if max_pop == 0 {
            return Vec::new();
        }

        let max_cooc = last_hot
            .iter()
            .filter_map(|h| self.cooccurrence.get(h))
            .flat_map(|row| row.values())
            .max()
            .copied()
            .unwrap_or(0);

        let mut scores: HashMap<String, f64> = HashMap::new();
        for (file, &pop) in &self.popularity {
            if last_hot.contains(file) {
                continue;
            }

            let age = self
                .last_seen
                .get(file)
                .map(|&seen| self.turn_count.saturating_sub(seen) as f64)
                .unwrap_or(f64::MAX);
            let recency = (-age / RECENCY_TAU).exp();

            let cooc_hits: u64 = last_hot
                .iter()
                .filter_map(|h| self.cooccurrence.get(h).and_then(|row| row.get(file)))
                .sum();
            let cooc = if max_cooc > 0 {
                cooc_hits as f64 / max_cooc as f64
            } else {
                0.0
            };

            let score = RECENCY_WEIGHT * recency
                + COOCCURRENCE_WEIGHT * cooc
                + POPULARITY_WEIGHT * pop as f64 / max_pop as f64;
            scores.insert(file.clone(), FALLBACK_CAP * score.min(1.0));
        }

        ranked(scores, PredictMode::Fallback)
    }

    /// Load prior model; an incompatible version is discarded with a
    /// warning so the caller can rebuild from the turn log.
    pub fn load(path: &Path) -> Option<Self> {
        match fovea_store::load_versioned::<Self>(path, PREDICTOR_MODEL_VERSION) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(error = %e, "discarding predictor model");
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        fovea_store::save_versioned(path, self)
    }
}

impl Default for Predictor {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_max(into: &mut HashMap<String, f64>, file: String, confidence: f64) {
    into.entry(file)
        .and_modify(|c| *c = c.max(confidence))
        .or_insert(confidence);
}

fn ranked(scores: HashMap<String, f64>, mode: PredictMode) -> Vec<Prediction> {
    let mut out: Vec<Prediction> = scores
        .into_iter()
        .map(|(file, confidence)| Prediction {
            file,
            confidence,
            mode,
        })
        .collect();
    out.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.file.cmp(&b.file))
    });
    out
}
