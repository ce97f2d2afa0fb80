//! Directory listing filter.
//!
//! Reduces a raw recursive listing to the source-relative file paths the
//! assembler should process: directories dropped, extensions matched
//! case-sensitively against the allowed set, the base path stripped as a
//! prefix. Order is whatever the underlying listing produced; nothing is
//! re-sorted here.

use std::ffi::OsStr;
use std::path::Path;

use crate::models::ListingEntry;

pub fn filter_listing(
    entries: &[ListingEntry],
    base_path: &str,
    extensions: &[String],
) -> Vec<String> {
    let prefix = normalized_prefix(base_path);

    entries
        .iter()
        .filter(|entry| !entry.is_dir)
        .filter(|entry| has_allowed_extension(&entry.path, extensions))
        .map(|entry| relative_to(&entry.path, &prefix))
        .collect()
}

/// Base path with exactly one trailing slash, or empty when there is no
/// base to strip.
fn normalized_prefix(base_path: &str) -> String {
    let trimmed = base_path.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

fn has_allowed_extension(path: &str, extensions: &[String]) -> bool {
    Path::new(path)
        .extension()
        .and_then(OsStr::to_str)
        .map(|ext| extensions.iter().any(|allowed| allowed == ext))
        .unwrap_or(false)
}

/// Strip the prefix when present. A path outside the base passes through
/// unchanged rather than being rejected.
fn relative_to(path: &str, prefix: &str) -> String {
    if !prefix.is_empty() {
        if let Some(stripped) = path.strip_prefix(prefix) {
            return stripped.to_string();
        }
    }
    path.to_string()
}
