//! Affinity learning and pre-warm prediction.
//!
//! The learner runs post-turn and owns the slow state: prompt-token to file
//! associations, co-activation edges, and per-file revisit rhythms. The
//! predictor owns the pre-warm model the router queries synchronously.

mod learner;
mod predictor;
pub mod text;

pub use learner::{Learner, Maturity, Rhythm, TurnOutcome, LEARNED_STATE_VERSION};
pub use predictor::{PredictMode, Prediction, Predictor, PREDICTOR_MODEL_VERSION};
