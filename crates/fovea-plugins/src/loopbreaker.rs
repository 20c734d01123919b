//! LoopBreaker: detects repeated near-identical tool calls.
//!
//! Keeps a ring of the last 12 work-tool signatures. Three signatures with
//! pairwise similarity >= 0.7 mean the assistant is circling; the next
//! prompt gets a strategy-change advisory and a violation is logged.

use crate::plugin::{Plugin, PluginCtx, ToolEvent, TurnEvents};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

const RING_SIZE: usize = 12;
const CLUSTER_SIZE: usize = 3;
const SIMILARITY_THRESHOLD: f64 = 0.7;
const MAX_OP_COMPONENTS: usize = 8;

const WORK_TOOLS: &[&str] = &["Edit", "Write", "MultiEdit", "Bash", "edit", "write", "bash"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub(crate) struct CallSignature {
    tool: String,
    path: String,
    op_hash: String,
    components: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct LoopState {
    ring: VecDeque<CallSignature>,
    pending_advisory: Option<String>,
    violations: u64,
}

pub struct LoopBreaker;

impl LoopBreaker {
    pub fn new() -> Self {
        Self
    }

    fn signature(event: &ToolEvent) -> Option<CallSignature> {
        if !WORK_TOOLS.contains(&event.tool.as_str()) {
            return None;
        }
        let target = event.target.as_deref()?;
        let path = target.replace('\\', "/");

        let components: Vec<String> = event
            .op
            .as_deref()
            .unwrap_or("")
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.len() >= 2)
            .take(MAX_OP_COMPONENTS)
            .map(str::to_lowercase)
            .collect();

        let digest = Sha256::digest(components.join(":").as_bytes());
        let op_hash = format!("{:x}", digest)[..12].to_string();

        Some(CallSignature {
            tool: event.tool.clone(),
            path,
            op_hash,
            components,
        })
    }

    /// Tool equality is mandatory; path similarity is shared suffix
    /// components over max depth; op similarity is a Jaccard over
    /// normalized components.
    pub(crate) fn similarity(a: &CallSignature, b: &CallSignature) -> f64 {
        if a.tool != b.tool {
            return 0.0;
        }
        (path_similarity(&a.path, &b.path) + component_jaccard(&a.components, &b.components)) / 2.0
    }

    fn detect(ring: &VecDeque<CallSignature>) -> Option<String> {
        let sigs: Vec<&CallSignature> = ring.iter().collect();
        let n = sigs.len();
        if n < CLUSTER_SIZE {
            return None;
        }

        // Newest cluster first so the advisory names the current fixation.
        for i in (0..n).rev() {
            for j in (0..i).rev() {
                if Self::similarity(sigs[i], sigs[j]) < SIMILARITY_THRESHOLD {
                    continue;
                }
                for k in (0..j).rev() {
                    if Self::similarity(sigs[i], sigs[k]) >= SIMILARITY_THRESHOLD
                        && Self::similarity(sigs[j], sigs[k]) >= SIMILARITY_THRESHOLD
                    {
                        return Some(sigs[i].path.clone());
                    }
                }
            }
        }
        None
    }
}

impl Default for LoopBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for LoopBreaker {
    fn name(&self) -> &'static str {
        "loopbreaker"
    }

    fn on_session_start(&mut self, ctx: &PluginCtx) -> anyhow::Result<Option<String>> {
        ctx.save_state(self.name(), &LoopState::default())?;
        Ok(Some("LoopBreaker: armed".to_string()))
    }

    fn on_prompt_pre(&mut self, ctx: &PluginCtx, _prompt: &str) -> anyhow::Result<Option<String>> {
        let mut state: LoopState = ctx.load_state(self.name());
        let Some(advisory) = state.pending_advisory.take() else {
            return Ok(None);
        };
        ctx.save_state(self.name(), &state)?;
        Ok(Some(advisory))
    }

    fn on_stop(&mut self, ctx: &PluginCtx, turn: &TurnEvents) -> anyhow::Result<Option<String>> {
        let mut state: LoopState = ctx.load_state(self.name());

        for event in &turn.tool_events {
            if let Some(sig) = Self::signature(event) {
                state.ring.push_back(sig);
            }
        }
        while state.ring.len() > RING_SIZE {
            state.ring.pop_front();
        }

        let detected = Self::detect(&state.ring);
        let note = if let Some(path) = detected {
            state.violations += 1;
            let file = path.rsplit('/').next().unwrap_or(&path);
            ctx.log_event(
                self.name(),
                "violation",
                &format!("{} similar attempts on {}", CLUSTER_SIZE, file),
            );
            state.pending_advisory = Some(format!(
                "strategy_change: {} attempts on `{}` look near-identical. \
                 Re-read the file, question the current approach, and try \
                 something structurally different instead of repeating the edit.",
                CLUSTER_SIZE, file
            ));
            Some(format!("[loopbreaker] loop detected on {}", file))
        } else {
            None
        };

        ctx.save_state(self.name(), &state)?;
        Ok(note)
    }
}

fn path_similarity(a: &str, b: &str) -> f64 {
    let pa: Vec<&str> = a.split('/').filter(|s| !s.is_empty()).collect();
    let pb: Vec<&str> = b.split('/').filter(|s| !s.is_empty()).collect();
    let max_depth = pa.len().max(pb.len());
    if max_depth == 0 {
        return 0.0;
    }

    let shared = pa
        .iter()
        .rev()
        .zip(pb.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    shared as f64 / max_depth as f64
}

fn component_jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let sa: std::collections::HashSet<&String> = a.iter().collect();
    let sb: std::collections::HashSet<&String> = b.iter().collect();
    let union = sa.union(&sb).count();
    if union == 0 {
        return 0.0;
    }
    sa.intersection(&sb).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(path: &str, op: &str) -> ToolEvent {
        ToolEvent {
            tool: "Edit".to_string(),
            target: Some(path.to_string()),
            op: Some(op.to_string()),
        }
    }

    #[test]
    fn identical_calls_have_similarity_one() {
        let a = LoopBreaker::signature(&edit("src/a.rs", "fn broken_thing")).unwrap();
        let b = LoopBreaker::signature(&edit("src/a.rs", "fn broken_thing")).unwrap();
        assert!((LoopBreaker::similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn different_tools_never_match() {
        let a = LoopBreaker::signature(&edit("src/a.rs", "fn x")).unwrap();
        let b = LoopBreaker::signature(&ToolEvent {
            tool: "Bash".to_string(),
            target: Some("src/a.rs".to_string()),
            op: Some("fn x".to_string()),
        })
        .unwrap();
        assert_eq!(LoopBreaker::similarity(&a, &b), 0.0);
    }

    #[test]
    fn path_similarity_uses_shared_suffix() {
        assert!((path_similarity("a/b/c.rs", "x/b/c.rs") - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(path_similarity("a/b/c.rs", "a/b/c.rs"), 1.0);
        assert_eq!(path_similarity("a.rs", "b.rs"), 0.0);
    }

    #[test]
    fn read_tools_produce_no_signature() {
        let read = ToolEvent {
            tool: "Read".to_string(),
            target: Some("src/a.rs".to_string()),
            op: None,
        };
        assert!(LoopBreaker::signature(&read).is_none());
    }

    #[test]
    fn detect_needs_three_similar_signatures() {
        let mut ring = VecDeque::new();
        ring.push_back(LoopBreaker::signature(&edit("src/a.rs", "fn f retry")).unwrap());
        ring.push_back(LoopBreaker::signature(&edit("src/a.rs", "fn f retry")).unwrap());
        assert!(LoopBreaker::detect(&ring).is_none());

        ring.push_back(LoopBreaker::signature(&edit("src/a.rs", "fn f retry")).unwrap());
        assert_eq!(LoopBreaker::detect(&ring), Some("src/a.rs".to_string()));
    }

    #[test]
    fn interleaved_other_file_does_not_mask_loop() {
        let mut ring = VecDeque::new();
        ring.push_back(LoopBreaker::signature(&edit("src/a.rs", "fn f retry")).unwrap());
        ring.push_back(LoopBreaker::signature(&edit("src/a.rs", "fn f retry")).unwrap());
        ring.push_back(LoopBreaker::signature(&edit("src/b.rs", "unrelated change")).unwrap());
        ring.push_back(LoopBreaker::signature(&edit("src/a.rs", "fn f retry")).unwrap());
        assert_eq!(LoopBreaker::detect(&ring), Some("src/a.rs".to_string()));
    }
}
