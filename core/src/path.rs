//! URL path joining and `@alias` placeholder discovery.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ApiError;

// An alias is an OData argument: it follows `(`, `=` or `,`. Quoted literals
// are matched first so an `@` inside them is never captured.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'[^']*'|[(=,]\s*(@[A-Za-z0-9_]+)").expect("valid regex")
});

/// Join `segment` onto `base` with exactly one `/`.
///
/// Leading and trailing separators on the segment are dropped, as is a
/// trailing separator on the base. Nothing inside either string is collapsed.
pub fn combine(base: &str, segment: &str) -> String {
    let base = base.trim_end_matches('/');
    let segment = segment.trim_matches('/');
    match (base.is_empty(), segment.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => segment.to_string(),
        (false, false) => format!("{base}/{segment}"),
    }
}

/// Reject relative paths a builder cannot extend with.
pub fn validate_relative(segment: &str) -> Result<(), ApiError> {
    if segment.is_empty() {
        return Ok(());
    }
    if segment.trim_matches('/').is_empty() {
        return Err(ApiError::invalid_path(segment, "path consists only of separators"));
    }
    if segment.contains("://") {
        return Err(ApiError::invalid_path(segment, "absolute URLs are not relative paths"));
    }
    validate_fragment(segment)
}

/// Reject text that would smuggle a query string or fragment into the path.
pub fn validate_fragment(fragment: &str) -> Result<(), ApiError> {
    if fragment.contains('?') {
        return Err(ApiError::invalid_path(fragment, "query strings belong in the parameter map"));
    }
    if fragment.contains('#') {
        return Err(ApiError::invalid_path(fragment, "fragments are not allowed"));
    }
    Ok(())
}

/// Every `@name` alias referenced in `path`, in order of appearance.
pub fn placeholders(path: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(path)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}
