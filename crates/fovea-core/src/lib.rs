//! Attention routing: per-turn scoring pipeline and context assembly.

mod config;
mod context;
mod ports;
mod router;
mod types;

pub use config::{Category, Config, DecayRates, KeywordEntry};
pub use context::{assemble_context, Assembly};
pub use ports::{Indexer, RepoMap};
pub use router::{RouteContext, Router, RoutingResult, RoutingStats, Selection};
pub use types::{clamp_score, AttentionState, Tier, ATTN_STATE_VERSION, SCORE_EPSILON, SCORE_MAX};
