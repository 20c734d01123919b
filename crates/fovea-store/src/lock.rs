//! Advisory per-project lock.
//!
//! Concurrent sessions in the same project serialize their state writes
//! through a lock file. The lock is advisory: a timed-out acquire degrades
//! to last-writer-wins, and the atomic rename in `io` still guarantees no
//! torn file either way.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::{Duration, Instant};

const STALE_AFTER: Duration = Duration::from_secs(10);
const RETRY_EVERY: Duration = Duration::from_millis(10);

/// Held lock; releases on drop.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    /// Try to acquire the lock, waiting up to `wait`. Returns `Ok(None)` on
    /// timeout; the caller proceeds unlocked.
    pub fn acquire(path: PathBuf, wait: Duration) -> std::io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let deadline = Instant::now() + wait;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(Some(Self { path }));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        tracing::warn!(path = %path.display(), "removing stale project lock");
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        tracing::warn!(path = %path.display(), "lock wait timed out, proceeding unlocked");
                        return Ok(None);
                    }
                    std::thread::sleep(RETRY_EVERY);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_is_stale(path: &std::path::Path) -> bool {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified
            .elapsed()
            .map(|age| age > STALE_AFTER)
            .unwrap_or(false),
        Err(_) => false,
    }
}
