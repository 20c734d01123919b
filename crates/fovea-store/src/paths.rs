//! Path resolution for state and telemetry files.
//!
//! Per-project state lives under `<home>/.fovea/projects/<hash>/`. When the
//! project is a linked git working copy, the learned and predictor models
//! resolve to the primary copy's directory so siblings share one model,
//! while attention state stays per-copy.

use crate::error::StoreError;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;

pub const HOME_ENV: &str = "FOVEA_HOME";
pub const CONFIG_ENV: &str = "FOVEA_CONFIG";
pub const DISABLE_ENV: &str = "FOVEA_DISABLE";

const TOOL_DIR: &str = ".fovea";

#[derive(Debug, Clone)]
pub struct Paths {
    home: PathBuf,
    project_root: PathBuf,
    project_dir: PathBuf,
    shared_dir: PathBuf,
}

impl Paths {
    /// Resolve paths for `project_root`. Honors `FOVEA_HOME`; falls back to
    /// per-copy placement when the VCS query fails.
    pub fn resolve(project_root: &Path) -> Result<Self, StoreError> {
        let base = match std::env::var_os(HOME_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::home_dir().ok_or(StoreError::HomeNotFound)?,
        };
        let home = base.join(TOOL_DIR);

        let root = std::fs::canonicalize(project_root)
            .unwrap_or_else(|_| project_root.to_path_buf());
        let project_dir = home.join("projects").join(project_hash(&root));

        let shared_dir = match git_common_root(&root) {
            Some(common_root) if common_root != root => {
                home.join("projects").join(project_hash(&common_root))
            }
            _ => project_dir.clone(),
        };

        Ok(Self {
            home,
            project_root: root,
            project_dir,
            shared_dir,
        })
    }

    pub fn resolve_cwd() -> Result<Self, StoreError> {
        let cwd = std::env::current_dir()?;
        Self::resolve(&cwd)
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.project_dir)?;
        std::fs::create_dir_all(&self.shared_dir)?;
        Ok(())
    }

    /// Attention state is always per working copy.
    pub fn attn_state(&self) -> PathBuf {
        self.project_dir.join("attn_state.json")
    }

    /// Learned model, shared across sibling working copies.
    pub fn learned_state(&self) -> PathBuf {
        self.shared_dir.join("learned_state.json")
    }

    /// Predictor model, shared across sibling working copies.
    pub fn predictor_model(&self) -> PathBuf {
        self.shared_dir.join("predictor_model.json")
    }

    pub fn turns_log(&self) -> PathBuf {
        self.shared_dir.join("turns.jsonl")
    }

    pub fn events_log(&self) -> PathBuf {
        self.project_dir.join("events.jsonl")
    }

    pub fn session_state(&self) -> PathBuf {
        self.project_dir.join("session_state.json")
    }

    /// Injection details from the prompt hook, consumed by the stop hook.
    pub fn pending_turn(&self) -> PathBuf {
        self.project_dir.join("pending_turn.json")
    }

    pub fn plugin_state(&self, plugin: &str) -> PathBuf {
        self.project_dir
            .join("plugins")
            .join(format!("{}_state.json", plugin))
    }

    pub fn lock_file(&self) -> PathBuf {
        self.project_dir.join("project.lock")
    }

    fn config_dir(&self) -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => self.home.clone(),
        }
    }

    pub fn keywords_config(&self) -> PathBuf {
        self.config_dir().join("keywords.json")
    }

    pub fn overrides_config(&self) -> PathBuf {
        self.config_dir().join("router_overrides.json")
    }

    pub fn plugins_config(&self) -> PathBuf {
        self.config_dir().join("plugins.json")
    }

    /// Host assistant usage cache consumed by the burn-rate monitor.
    pub fn usage_stats(&self) -> PathBuf {
        self.home.join("stats-cache.json")
    }
}

fn project_hash(root: &Path) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    let sanitized: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();

    let digest = format!("{:x}", Sha256::digest(root.to_string_lossy().as_bytes()));
    format!("{}-{}", sanitized, &digest[..8])
}

/// Working-tree root that owns the VCS metadata dir, when this copy is a
/// linked worktree of it. `None` for the primary copy or outside git.
fn git_common_root(root: &Path) -> Option<PathBuf> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(["rev-parse", "--git-common-dir"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let raw = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if raw.is_empty() || raw == ".git" {
        return None;
    }

    let common_dir = if Path::new(&raw).is_absolute() {
        PathBuf::from(&raw)
    } else {
        root.join(&raw)
    };
    let common_dir = std::fs::canonicalize(&common_dir).unwrap_or(common_dir);
    common_dir.parent().map(|p| p.to_path_buf())
}
