#![allow(dead_code)]

use fovea_core::{Category, Config, KeywordEntry};

/// Temp project root populated with the given files.
pub fn project_with_files(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
    dir
}

pub fn keyword(pattern: &str, target: &str) -> KeywordEntry {
    KeywordEntry {
        pattern: pattern.to_string(),
        targets: vec![target.to_string()],
        category: Category::Code,
        weight: 1.0,
    }
}

pub fn config_with_keywords(entries: Vec<KeywordEntry>) -> Config {
    Config::default().with_keywords(entries)
}
