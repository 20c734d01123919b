//! Persistent state, path resolution, and telemetry records.
//!
//! Every on-disk document the router family owns goes through this crate:
//! atomic writes, versioned loads, JSONL appenders, and the advisory
//! project lock that keeps concurrent sessions from trampling each other.

mod clock;
mod error;
mod io;
mod lock;
mod paths;
mod tokens;
mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::StoreError;
pub use io::{append_jsonl, atomic_write, load_versioned, read_jsonl, save_versioned};
pub use lock::ProjectLock;
pub use paths::{Paths, CONFIG_ENV, DISABLE_ENV, HOME_ENV};
pub use tokens::estimate_tokens;
pub use types::{trim_prompt, EventLog, EventRecord, TurnRecord};
