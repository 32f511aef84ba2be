//! Attachment filename generation.
//!
//! `{query_name}_{YYYY-MM-DD}.csv`, with the query name reduced to
//! characters that are safe on Windows, macOS, and Linux.

use chrono::NaiveDate;

const MAX_STEM_LEN: usize = 200;
const FALLBACK_STEM: &str = "report";

/// Reserved filenames on Windows.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

pub fn report_filename(query_name: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", sanitize_stem(query_name), date.format("%Y-%m-%d"))
}

/// Keep ASCII alphanumerics and `-`; collapse separators into one `_`;
/// drop everything else.
pub fn sanitize_stem(s: &str) -> String {
    let mut result = String::new();
    let mut last_was_underscore = false;

    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            result.push(c);
            last_was_underscore = false;
        } else if matches!(c, ' ' | '_' | '.' | '/' | '\\' | ':') || c.is_whitespace() {
            if !last_was_underscore && !result.is_empty() {
                result.push('_');
                last_was_underscore = true;
            }
        }
    }

    if result.len() > MAX_STEM_LEN {
        result.truncate(MAX_STEM_LEN);
    }
    let trimmed = result.trim_matches(|c| c == '_' || c == '-');
    if trimmed.is_empty() {
        return FALLBACK_STEM.to_string();
    }
    if RESERVED_NAMES.contains(&trimmed.to_ascii_uppercase().as_str()) {
        return format!("{FALLBACK_STEM}_{trimmed}");
    }
    trimmed.to_string()
}
