//! Atomic writes, versioned state documents, and JSONL append/read.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Write `data` via a uniquely named temp file in the same directory,
/// then rename over `path`. A crash mid-write leaves the previous
/// committed content intact; readers never observe a torn file.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp = path.with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));

    std::fs::write(&tmp, data)?;
    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = std::fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Load a versioned JSON state document. Returns `Ok(None)` when the file
/// does not exist; `Err(VersionMismatch)` / `Err(Corrupt)` tell the caller
/// which discard policy applies.
pub fn load_versioned<T>(path: &Path, expected_version: u64) -> Result<Option<T>, StoreError>
where
    T: for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let found = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0);
    if found != expected_version {
        return Err(StoreError::VersionMismatch {
            path: path.to_path_buf(),
            found,
            expected: expected_version,
        });
    }

    let parsed = serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(Some(parsed))
}

/// Serialize and atomically persist a state document.
pub fn save_versioned<T: Serialize>(path: &Path, state: &T) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(state).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    atomic_write(path, json.as_bytes())?;
    Ok(())
}

/// Append one record to a JSONL file, creating parents as needed.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let json = serde_json::to_string(record)?;
    writeln!(file, "{}", json)
}

/// Read every parseable record from a JSONL file. Malformed lines are
/// skipped with a warning; a missing file reads as empty.
pub fn read_jsonl<T>(path: &Path) -> std::io::Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping malformed jsonl line"),
        }
    }
    Ok(records)
}
