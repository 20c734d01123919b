//! The 8-phase attention router.
//!
//! Phases run in order on the latency path: decay, keyword activation,
//! learned boost, co-activation spread, pinned floor, demoted penalty,
//! predictive pre-warm, then the cache-stability rank with tier caps.
//! Every phase that writes clamps scores to [0, SCORE_MAX].

use crate::config::Config;
use crate::context::{assemble_context, Assembly};
use crate::ports::{Indexer, RepoMap};
use crate::types::{clamp_score, AttentionState, Tier, SCORE_EPSILON};
use fovea_learn::text::file_mentions;
use fovea_learn::{Learner, Maturity, Predictor};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};

/// How many indexer hits may seed scores in Phase 2.
const INDEXER_SEED_LIMIT: usize = 5;
const INDEXER_SEED_WEIGHT: f64 = 0.6;

/// Read-only collaborators for one turn.
pub struct RouteContext<'a> {
    pub learner: Option<&'a Learner>,
    pub predictor: Option<&'a Predictor>,
    pub indexer: Option<&'a dyn Indexer>,
    pub repo_map: Option<&'a dyn RepoMap>,
    /// hot set persisted by the previous turn, feeds the Markov predictor
    pub last_hot: Vec<String>,
    pub project_root: &'a Path,
}

impl<'a> RouteContext<'a> {
    pub fn new(project_root: &'a Path) -> Self {
        Self {
            learner: None,
            predictor: None,
            indexer: None,
            repo_map: None,
            last_hot: Vec::new(),
            project_root,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoutingStats {
    pub phase_micros: [u64; 8],
    /// co-activation BFS returned early on its phase budget
    pub coactivation_partial: bool,
    /// predictor query ran past its phase budget
    pub predictor_overrun: bool,
    /// whole turn ran past the soft deadline
    pub deadline_overrun: bool,
    pub missing_files: usize,
    pub output_chars: usize,
    pub output_truncated: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub hot: Vec<String>,
    pub warm: Vec<String>,
    pub cold: Vec<String>,
}

#[derive(Debug)]
pub struct RoutingResult {
    pub directly_activated: HashSet<String>,
    pub selection: Selection,
    pub output: String,
    pub stats: RoutingStats,
}

#[derive(Debug)]
pub struct Router {
    config: Config,
}

impl Router {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one turn. Mutates `state` in place; the caller commits it to
    /// disk after this returns.
    pub fn route(
        &self,
        state: &mut AttentionState,
        prompt: &str,
        ctx: &RouteContext<'_>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> RoutingResult {
        let turn_started = Instant::now();
        let mut stats = RoutingStats::default();
        let mut phase_started = Instant::now();
        let mut mark = |stats: &mut RoutingStats, slot: usize, started: &mut Instant| {
            stats.phase_micros[slot] = started.elapsed().as_micros() as u64;
            *started = Instant::now();
        };

        self.phase_decay(state);
        mark(&mut stats, 0, &mut phase_started);

        let directly_activated = self.phase_keywords(state, prompt, ctx);
        mark(&mut stats, 1, &mut phase_started);

        self.phase_learned_boost(state, prompt, ctx.learner);
        mark(&mut stats, 2, &mut phase_started);

        self.phase_coactivation(state, &directly_activated, ctx.learner, &mut stats);
        mark(&mut stats, 3, &mut phase_started);

        self.phase_pinned_floor(state);
        mark(&mut stats, 4, &mut phase_started);

        self.phase_demoted_penalty(state);
        mark(&mut stats, 5, &mut phase_started);

        self.phase_prewarm(state, prompt, ctx, &mut stats);
        mark(&mut stats, 6, &mut phase_started);

        let selection = self.phase_rank(state);
        mark(&mut stats, 7, &mut phase_started);

        state.turn_count += 1;
        state.last_update = Some(now);

        let Assembly {
            output,
            missing,
            truncated,
        } = assemble_context(&self.config, &selection, ctx.repo_map, ctx.project_root);

        // A missing file keeps a zero score for one turn (pending purge);
        // the next decay pass removes it. The pinned floor still holds.
        stats.missing_files = missing.len();
        for path in missing {
            if !self.config.is_pinned(&path) {
                state.scores.insert(path, 0.0);
            }
        }

        stats.output_chars = output.len();
        stats.output_truncated = truncated;
        stats.deadline_overrun =
            turn_started.elapsed() > Duration::from_millis(self.config.turn_budget_ms);
        if stats.deadline_overrun {
            tracing::warn!(
                elapsed_ms = turn_started.elapsed().as_millis() as u64,
                budget_ms = self.config.turn_budget_ms,
                "turn ran past soft deadline"
            );
        }

        RoutingResult {
            directly_activated,
            selection,
            output,
            stats,
        }
    }

    /// Phase 1: per-category decay, pruning entries below epsilon.
    fn phase_decay(&self, state: &mut AttentionState) {
        let config = &self.config;
        state.scores.retain(|path, score| {
            *score = clamp_score(*score * config.decay_for(path));
            *score >= SCORE_EPSILON
        });
        let scores = &state.scores;
        state.streaks.retain(|path, _| scores.contains_key(path));
    }

    /// Phase 2: keyword and file-mention activation, plus indexer seeding.
    fn phase_keywords(
        &self,
        state: &mut AttentionState,
        prompt: &str,
        ctx: &RouteContext<'_>,
    ) -> HashSet<String> {
        let prompt_lower = prompt.to_lowercase();
        let tokens: HashSet<&str> = prompt_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut activated = HashSet::new();

        for entry in &self.config.keywords {
            let word_pattern = entry.pattern.chars().all(|c| c.is_alphanumeric());
            let hit = if word_pattern {
                tokens.contains(entry.pattern.as_str())
            } else {
                prompt_lower.contains(&entry.pattern)
            };
            if !hit {
                continue;
            }
            for target in &entry.targets {
                let score = state.scores.entry(target.clone()).or_insert(0.0);
                *score = clamp_score(score.max(entry.weight));
                activated.insert(target.clone());
            }
        }

        for mention in file_mentions(prompt) {
            let resolved = self.resolve_mention(state, ctx.project_root, &mention);
            if let Some(path) = resolved {
                let score = state.scores.entry(path.clone()).or_insert(0.0);
                *score = clamp_score(score.max(1.0));
                activated.insert(path);
            }
        }

        if let Some(indexer) = ctx.indexer {
            let hits = indexer.query(prompt);
            let max = hits.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
            if max > 0.0 {
                for (file, raw) in hits.into_iter().take(INDEXER_SEED_LIMIT) {
                    let seed = INDEXER_SEED_WEIGHT * (raw / max);
                    let score = state.scores.entry(file).or_insert(0.0);
                    *score = clamp_score(score.max(seed));
                }
            }
        }

        activated
    }

    fn resolve_mention(
        &self,
        state: &AttentionState,
        project_root: &Path,
        mention: &str,
    ) -> Option<String> {
        if project_root.join(mention).is_file() {
            return Some(mention.to_string());
        }
        let suffix = format!("/{}", mention);
        state
            .scores
            .keys()
            .filter(|known| known.as_str() == mention || known.ends_with(&suffix))
            .min()
            .cloned()
    }

    /// Phase 3: IDF-weighted learned associations. Zero effect while the
    /// learner is observing.
    fn phase_learned_boost(
        &self,
        state: &mut AttentionState,
        prompt: &str,
        learner: Option<&Learner>,
    ) {
        let Some(learner) = learner else { return };
        if learner.maturity() != Maturity::Active {
            return;
        }

        for token in fovea_learn::text::tokenize(prompt) {
            let idf = learner.idf(&token);
            for (file, strength) in learner.query(&token) {
                let score = state.scores.entry(file).or_insert(0.0);
                *score = clamp_score(*score + self.config.learned_boost * idf * strength);
            }
        }
    }

    /// Phase 4: bounded BFS over the learned co-activation graph.
    fn phase_coactivation(
        &self,
        state: &mut AttentionState,
        directly_activated: &HashSet<String>,
        learner: Option<&Learner>,
        stats: &mut RoutingStats,
    ) {
        let Some(learner) = learner else { return };
        let edges = learner.coactivation_edges();
        if edges.is_empty() || directly_activated.is_empty() {
            return;
        }

        let mut graph: UnGraph<String, f64> = UnGraph::new_undirected();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for (a, b, w) in &edges {
            let ai = *nodes
                .entry(a.as_str())
                .or_insert_with(|| graph.add_node(a.clone()));
            let bi = *nodes
                .entry(b.as_str())
                .or_insert_with(|| graph.add_node(b.clone()));
            graph.add_edge(ai, bi, *w);
        }

        let budget = Duration::from_millis(self.config.coactivation_budget_ms);
        let started = Instant::now();

        let mut seeds: Vec<&String> = directly_activated.iter().collect();
        seeds.sort();

        let mut bonus: HashMap<String, f64> = HashMap::new();
        'seeds: for seed in seeds {
            let Some(&root) = nodes.get(seed.as_str()) else {
                continue;
            };
            let mut depth: HashMap<NodeIndex, u8> = HashMap::from([(root, 0)]);
            let mut queue: VecDeque<NodeIndex> = VecDeque::from([root]);

            while let Some(node) = queue.pop_front() {
                if started.elapsed() > budget {
                    stats.coactivation_partial = true;
                    break 'seeds;
                }
                let d = depth[&node];
                if d >= 2 {
                    continue;
                }
                for edge in graph.edges(node) {
                    let next = edge.target();
                    if depth.contains_key(&next) {
                        continue;
                    }
                    depth.insert(next, d + 1);
                    queue.push_back(next);

                    let weight = *edge.weight();
                    let step = if d == 0 {
                        self.config.coactivation_boost * weight
                    } else {
                        self.config.transitive_boost * weight
                    };
                    bonus
                        .entry(graph[next].clone())
                        .and_modify(|b| *b = b.max(step))
                        .or_insert(step);
                }
            }
        }

        for (path, step) in bonus {
            let pre = state.scores.get(&path).copied().unwrap_or(0.0);
            let mut post = clamp_score(pre + step);
            if directly_activated.contains(&path) {
                // Directly activated files do not ride their own neighbors
                // past full activation.
                post = post.min(pre.max(1.0));
            }
            state.scores.insert(path, post);
        }
    }

    /// Phase 5: pinned files never sit below the warm threshold.
    fn phase_pinned_floor(&self, state: &mut AttentionState) {
        let floor = self.config.pinned_floor();
        for path in &self.config.pinned {
            let score = state.scores.entry(path.clone()).or_insert(0.0);
            *score = clamp_score(score.max(floor));
        }
    }

    /// Phase 6: demoted penalty; pinned wins when both are configured.
    fn phase_demoted_penalty(&self, state: &mut AttentionState) {
        for path in &self.config.demoted {
            if self.config.is_pinned(path) {
                continue;
            }
            if let Some(score) = state.scores.get_mut(path) {
                *score = clamp_score(*score * self.config.demoted_penalty);
            }
        }
    }

    /// Phase 7: additive pre-warm from the predictor, capped so it can
    /// never promote a file to Hot on its own.
    fn phase_prewarm(
        &self,
        state: &mut AttentionState,
        prompt: &str,
        ctx: &RouteContext<'_>,
        stats: &mut RoutingStats,
    ) {
        let Some(predictor) = ctx.predictor else { return };

        let started = Instant::now();
        let predictions = predictor.predict(prompt, &ctx.last_hot);
        if started.elapsed() > Duration::from_millis(self.config.predictor_budget_ms) {
            stats.predictor_overrun = true;
        }

        for prediction in predictions.iter().take(self.config.prewarm_limit) {
            let score = state.scores.entry(prediction.file.clone()).or_insert(0.0);
            *score = clamp_score(*score + self.config.prewarm_boost * prediction.confidence);
        }
    }

    /// Phase 8: cache-stability sort, tier caps, streak bookkeeping.
    fn phase_rank(&self, state: &mut AttentionState) -> Selection {
        let mut entries: Vec<(String, f64, u32)> = state
            .scores
            .iter()
            .map(|(path, &score)| (path.clone(), score, state.streak(path)))
            .collect();
        entries.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut selection = Selection::default();
        let mut warm_unpinned = 0usize;
        for (path, score, _) in entries {
            let mut tier = self.tier_for(score);
            if tier == Tier::Hot && selection.hot.len() >= self.config.max_hot {
                tier = Tier::Warm;
            }
            if tier == Tier::Warm {
                let pinned = self.config.is_pinned(&path);
                // Pinned files are exempt from warm eviction.
                if !pinned && warm_unpinned >= self.config.max_warm {
                    tier = Tier::Cold;
                } else if !pinned {
                    warm_unpinned += 1;
                }
            }
            match tier {
                Tier::Hot => selection.hot.push(path),
                Tier::Warm => selection.warm.push(path),
                Tier::Cold => selection.cold.push(path),
            }
        }

        let hot: HashSet<&String> = selection.hot.iter().collect();
        for path in state.scores.keys() {
            let streak = state.streaks.entry(path.clone()).or_insert(0);
            if hot.contains(path) {
                *streak += 1;
            } else {
                *streak = 0;
            }
        }

        selection
    }

    fn tier_for(&self, score: f64) -> Tier {
        if score >= self.config.hot_threshold {
            Tier::Hot
        } else if score >= self.config.warm_threshold {
            Tier::Warm
        } else {
            Tier::Cold
        }
    }
}
