use std::path::PathBuf;

/// Load/save failures, split by recovery policy: a version mismatch and a
/// corrupt document are both discarded and rebuilt, but they are logged
/// differently and a mismatch may trigger a rebuild from the turn log.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("home directory could not be resolved")]
    HomeNotFound,

    #[error("{path}: version {found}, expected {expected}")]
    VersionMismatch {
        path: PathBuf,
        found: u64,
        expected: u64,
    },

    #[error("{path}: corrupt state document: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
