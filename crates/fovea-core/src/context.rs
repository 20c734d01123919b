//! Context assembly: turn a tiered selection into the output blob.
//!
//! Hot files contribute full content (per-file cap, parallel reads), warm
//! files an outline, cold files a trailing eviction manifest. The blob
//! never exceeds `max_context_chars`.

use crate::config::Config;
use crate::ports::RepoMap;
use crate::router::Selection;
use rayon::prelude::*;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const MAX_PARALLEL_READS: usize = 8;
const WARM_FALLBACK_LINES: usize = 20;
/// Below this much remaining budget a section is deferred instead of
/// truncated to an unreadable stub.
const MIN_SECTION_CHARS: usize = 80;

static NOTIFICATION_RE: OnceLock<Regex> = OnceLock::new();
static REMINDER_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Default)]
pub struct Assembly {
    pub output: String,
    /// files that could not be read; the router zeroes their scores
    pub missing: Vec<String>,
    pub truncated: bool,
}

pub fn assemble_context(
    config: &Config,
    selection: &Selection,
    repo_map: Option<&dyn RepoMap>,
    project_root: &Path,
) -> Assembly {
    let mut assembly = Assembly::default();
    let mut deferred: Vec<(&'static str, String)> = Vec::new();
    let mut overflowed = false;

    let hot_reads = read_parallel(project_root, &selection.hot);
    for (path, content) in hot_reads {
        match content {
            Some(content) => {
                let cleaned = strip_injected_spans(&content);
                let body = cap_content(&cleaned, config.hot_file_char_cap);
                let section = format!("[HOT] {}\n{}\n\n", path, body);
                place_section(
                    config,
                    &mut assembly,
                    &mut deferred,
                    &mut overflowed,
                    "HOT",
                    path,
                    section,
                );
            }
            None => {
                tracing::warn!(path = %path, "hot file unreadable, skipping");
                assembly.missing.push(path);
            }
        }
    }

    for path in &selection.warm {
        let outline = warm_outline(repo_map, project_root, path);
        let Some(outline) = outline else {
            tracing::warn!(path = %path, "warm file unreadable, skipping");
            assembly.missing.push(path.clone());
            continue;
        };
        let section = if outline.is_empty() {
            format!("[WARM] {}\n\n", path)
        } else {
            format!("[WARM] {}\n{}\n\n", path, outline)
        };
        place_section(
            config,
            &mut assembly,
            &mut deferred,
            &mut overflowed,
            "WARM",
            path.clone(),
            section,
        );
    }

    for (tier, path) in deferred {
        assembly.output.push_str(&format!("[{}] {} (deferred)\n", tier, path));
    }

    if !selection.cold.is_empty() {
        assembly
            .output
            .push_str(&format!("evicted: {}\n", selection.cold.join(", ")));
    }

    if assembly.output.len() > config.max_context_chars {
        assembly.output = truncate_chars(&assembly.output, config.max_context_chars);
        assembly.truncated = true;
    }

    assembly
}

fn place_section(
    config: &Config,
    assembly: &mut Assembly,
    deferred: &mut Vec<(&'static str, String)>,
    overflowed: &mut bool,
    tier: &'static str,
    path: String,
    section: String,
) {
    if *overflowed {
        // Once one section has overflowed, everything after is path-only.
        deferred.push((tier, path));
        return;
    }

    let remaining = config
        .max_context_chars
        .saturating_sub(assembly.output.len());
    if section.len() <= remaining {
        assembly.output.push_str(&section);
    } else if remaining >= MIN_SECTION_CHARS {
        // the overflowing file itself is truncated to fit
        let marker = "\n[truncated to fit]\n";
        let keep = remaining.saturating_sub(marker.len());
        assembly.output.push_str(&truncate_chars(&section, keep));
        assembly.output.push_str(marker);
        assembly.truncated = true;
        *overflowed = true;
    } else {
        assembly.truncated = true;
        *overflowed = true;
        deferred.push((tier, path));
    }
}

fn read_parallel(root: &Path, paths: &[String]) -> Vec<(String, Option<String>)> {
    if paths.is_empty() {
        return Vec::new();
    }

    let read = |path: &String| (path.clone(), read_file(root, path));
    let threads = paths.len().clamp(1, MAX_PARALLEL_READS);
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => pool.install(|| paths.par_iter().map(read).collect()),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to serial file reads");
            paths.iter().map(read).collect()
        }
    }
}

fn read_file(root: &Path, path: &str) -> Option<String> {
    let resolved: PathBuf = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        root.join(path)
    };
    std::fs::read_to_string(resolved).ok()
}

fn warm_outline(repo_map: Option<&dyn RepoMap>, root: &Path, path: &str) -> Option<String> {
    if let Some(mapper) = repo_map {
        if let Some(outline) = mapper.outline(path) {
            return Some(strip_injected_spans(&outline));
        }
    }
    let content = read_file(root, path)?;
    let cleaned = strip_injected_spans(&content);
    Some(first_nonblank_lines(&cleaned, WARM_FALLBACK_LINES))
}

/// Remove host-injected spans, including any embedded inside file bodies.
pub fn strip_injected_spans(content: &str) -> String {
    let notification = NOTIFICATION_RE.get_or_init(|| {
        Regex::new(r"(?s)<task-notification>.*?</task-notification>")
            .expect("notification pattern is valid")
    });
    let reminder = REMINDER_RE.get_or_init(|| {
        Regex::new(r"(?s)<system-reminder>.*?</system-reminder>")
            .expect("reminder pattern is valid")
    });

    let stripped = notification.replace_all(content, "");
    reminder.replace_all(&stripped, "").into_owned()
}

fn first_nonblank_lines(content: &str, limit: usize) -> String {
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(limit)
        .collect::<Vec<_>>()
        .join("\n")
}

fn cap_content(content: &str, cap: usize) -> String {
    if content.len() <= cap {
        return content.to_string();
    }
    let mut out = truncate_chars(content, cap);
    out.push_str(&format!("\n[truncated at {} chars]", cap));
    out
}

fn truncate_chars(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
