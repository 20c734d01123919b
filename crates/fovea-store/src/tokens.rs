//! Fast token estimation.
//!
//! Exact BPE counting is out of scope; routing only needs a budget-grade
//! estimate. Lines are classified by shape and charged a per-class
//! chars-per-token rate (code ~2.5, markdown ~3.0, prose ~4.0).

pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let mut weighted_chars = 0.0f64;
    for line in text.lines() {
        let chars = line.len().max(1) as f64;
        weighted_chars += chars / chars_per_token(line);
    }

    (weighted_chars.round() as usize).max(1)
}

fn chars_per_token(line: &str) -> f64 {
    let trimmed = line.trim_start();

    let punct = line
        .chars()
        .filter(|c| "{}[]();:=<>|&!*/\\".contains(*c))
        .count();
    let looks_like_code = punct * 12 >= line.len().max(1)
        || line.starts_with("    ")
        || line.starts_with('\t');
    let looks_like_markdown =
        trimmed.starts_with('#') || trimmed.starts_with("- ") || trimmed.starts_with("* ");

    if looks_like_code {
        2.5
    } else if looks_like_markdown {
        3.0
    } else {
        4.0
    }
}
