//! BurnRate: token budget runway monitor.
//!
//! Samples the host assistant's usage cache on each prompt, keeps an EWMA
//! tokens/min over a 15 minute window, and warns when the projected time
//! to quota exhaustion crosses 30 and then 10 minutes. Each threshold
//! fires at most once per session.

use crate::plugin::{Plugin, PluginCtx};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const WINDOW_MINUTES: i64 = 15;
const EWMA_ALPHA: f64 = 0.3;
const WARN_MINUTES: f64 = 30.0;
const CRITICAL_MINUTES: f64 = 10.0;
/// assumed window quota when the stats cache does not report one
const DEFAULT_QUOTA: u64 = 150_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    at: DateTime<Utc>,
    tokens: u64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct BurnState {
    samples: VecDeque<Sample>,
    rate_per_minute: Option<f64>,
    warned_low: bool,
    warned_critical: bool,
}

pub struct BurnRate;

impl BurnRate {
    pub fn new() -> Self {
        Self
    }

    fn session_tokens(stats: &serde_json::Value) -> Option<u64> {
        stats.get("sessionTokens").and_then(|v| v.as_u64())
    }

    fn quota(stats: &serde_json::Value) -> u64 {
        stats
            .get("quotaTokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_QUOTA)
    }

    fn push_sample(state: &mut BurnState, now: DateTime<Utc>, tokens: u64) {
        state.samples.push_back(Sample { at: now, tokens });
        let horizon = now - Duration::minutes(WINDOW_MINUTES);
        while state.samples.front().is_some_and(|s| s.at < horizon) {
            state.samples.pop_front();
        }
    }

    /// Update the EWMA from the two most recent samples.
    fn update_rate(state: &mut BurnState) {
        let n = state.samples.len();
        if n < 2 {
            return;
        }
        let prev = &state.samples[n - 2];
        let last = &state.samples[n - 1];

        let minutes = (last.at - prev.at).num_milliseconds() as f64 / 60_000.0;
        if minutes <= 0.0 {
            return;
        }
        let instant = last.tokens.saturating_sub(prev.tokens) as f64 / minutes;

        state.rate_per_minute = Some(match state.rate_per_minute {
            Some(prev_rate) => (1.0 - EWMA_ALPHA) * prev_rate + EWMA_ALPHA * instant,
            None => instant,
        });
    }

    fn minutes_remaining(state: &BurnState, stats: &serde_json::Value) -> Option<f64> {
        let rate = state.rate_per_minute?;
        if rate <= 0.0 {
            return None;
        }
        let used = Self::session_tokens(stats)?;
        let remaining = Self::quota(stats).saturating_sub(used);
        Some(remaining as f64 / rate)
    }
}

impl Default for BurnRate {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for BurnRate {
    fn name(&self) -> &'static str {
        "burnrate"
    }

    fn on_session_start(&mut self, ctx: &PluginCtx) -> anyhow::Result<Option<String>> {
        let mut state = BurnState::default();
        let message = match ctx.read_usage_stats() {
            Some(stats) => {
                if let Some(tokens) = Self::session_tokens(&stats) {
                    Self::push_sample(&mut state, ctx.now(), tokens);
                    let pct = tokens as f64 / Self::quota(&stats) as f64 * 100.0;
                    Some(format!("BurnRate: armed ({:.0}% of window used)", pct))
                } else {
                    Some("BurnRate: armed".to_string())
                }
            }
            None => None,
        };
        ctx.save_state(self.name(), &state)?;
        Ok(message)
    }

    fn on_prompt_pre(&mut self, ctx: &PluginCtx, _prompt: &str) -> anyhow::Result<Option<String>> {
        let Some(stats) = ctx.read_usage_stats() else {
            return Ok(None);
        };
        let Some(tokens) = Self::session_tokens(&stats) else {
            return Ok(None);
        };

        let mut state: BurnState = ctx.load_state(self.name());
        Self::push_sample(&mut state, ctx.now(), tokens);
        Self::update_rate(&mut state);

        let advisory = match Self::minutes_remaining(&state, &stats) {
            Some(minutes) if minutes <= CRITICAL_MINUTES && !state.warned_critical => {
                state.warned_critical = true;
                ctx.log_event(
                    self.name(),
                    "quota_critical",
                    &format!("{:.0} minutes of quota left", minutes),
                );
                Some(format!(
                    "burn_rate CRITICAL: ~{:.0} minutes until the token window is \
                     exhausted ({:.0} tokens/min). Prefer small, focused steps.",
                    minutes,
                    state.rate_per_minute.unwrap_or(0.0)
                ))
            }
            Some(minutes) if minutes <= WARN_MINUTES && !state.warned_low => {
                state.warned_low = true;
                ctx.log_event(
                    self.name(),
                    "quota_low",
                    &format!("{:.0} minutes of quota left", minutes),
                );
                Some(format!(
                    "burn_rate: ~{:.0} minutes until the token window is exhausted \
                     at the current pace.",
                    minutes
                ))
            }
            _ => None,
        };

        ctx.save_state(self.name(), &state)?;
        Ok(advisory)
    }
}
