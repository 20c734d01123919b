//! Narrow interfaces to external collaborators.
//!
//! Full-text indexing and symbol extraction live outside this repo; the
//! router only consumes these shapes.

/// Repository search: relevance-scored files for a prompt.
pub trait Indexer {
    fn query(&self, prompt: &str) -> Vec<(String, f64)>;
}

/// Symbol-level outline of a file (signatures, headings). `None` when the
/// file is unknown to the mapper.
pub trait RepoMap {
    fn outline(&self, path: &str) -> Option<String>;
}
