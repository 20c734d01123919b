//! Behavioral monitors over the router's telemetry.
//!
//! Each plugin declares the lifecycle hooks it cares about; the supervisor
//! dispatches in registration order and isolates failures so one broken
//! monitor never takes down a turn.

pub mod burnrate;
pub mod loopbreaker;
mod plugin;
mod supervisor;
pub mod verifyfirst;

pub use burnrate::BurnRate;
pub use loopbreaker::LoopBreaker;
pub use plugin::{Plugin, PluginCtx, RoutingSummary, ToolEvent, TurnEvents};
pub use supervisor::Supervisor;
pub use verifyfirst::VerifyFirst;
