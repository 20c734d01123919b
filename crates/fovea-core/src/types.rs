//! Attention state and tiers.

use chrono::{DateTime, Utc};
use fovea_store::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const ATTN_STATE_VERSION: u64 = 2;

/// Scores saturate here; every phase that writes clamps on exit.
pub const SCORE_MAX: f64 = 1.2;

/// Entries below this are dropped during decay.
pub const SCORE_EPSILON: f64 = 0.01;

pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, SCORE_MAX)
}

/// Inclusion bucket derived from score and thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    /// Full content injection.
    #[serde(rename = "HOT")]
    Hot,
    /// Outline only.
    #[serde(rename = "WARM")]
    Warm,
    /// Named in the eviction manifest.
    #[serde(rename = "COLD")]
    Cold,
}

/// Session-local attention scores, persisted each turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionState {
    pub version: u64,
    pub turn_count: u64,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    pub scores: HashMap<String, f64>,
    /// consecutive turns each file has been Hot
    pub streaks: HashMap<String, u32>,
}

impl AttentionState {
    pub fn new() -> Self {
        Self {
            version: ATTN_STATE_VERSION,
            turn_count: 0,
            last_update: None,
            scores: HashMap::new(),
            streaks: HashMap::new(),
        }
    }

    /// Load committed state; corrupt or mismatched documents fall back to
    /// empty with a warning, per the degraded-operation policy.
    pub fn load(path: &Path) -> Self {
        match fovea_store::load_versioned::<Self>(path, ATTN_STATE_VERSION) {
            Ok(Some(state)) => state,
            Ok(None) => Self::new(),
            Err(e) => {
                tracing::warn!(error = %e, "discarding attention state, starting empty");
                Self::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        fovea_store::save_versioned(path, self)
    }

    pub fn streak(&self, path: &str) -> u32 {
        self.streaks.get(path).copied().unwrap_or(0)
    }
}

impl Default for AttentionState {
    fn default() -> Self {
        Self::new()
    }
}
