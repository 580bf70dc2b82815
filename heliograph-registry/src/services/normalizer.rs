//! Title, DOI and author-name normalization
//!
//! Normalized forms feed the composite and fuzzy duplicate strategies and
//! the unique DOI constraint, so they must be deterministic across sources.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// DOI resolver prefixes, stripped in this order (at most one)
const DOI_PREFIXES: [&str; 5] = [
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi:",
];

/// Normalize a title for comparison
///
/// Decomposes (NFD) and drops combining marks, lowercases, removes
/// punctuation except `-`/`_`, turns `-`/`_` runs into a single space and
/// collapses whitespace.
pub fn normalize_title(title: &str) -> String {
    let filtered: String = title
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .map(|c| if c == '-' || c == '_' { ' ' } else { c })
        .collect();

    collapse_whitespace(&filtered)
}

/// Normalize a DOI: strip one resolver prefix, lowercase
///
/// Returns `None` for missing input or input that is empty after stripping.
pub fn normalize_doi(doi: Option<&str>) -> Option<String> {
    let trimmed = doi?.trim();
    if trimmed.is_empty() {
        return None;
    }

    let lowered = trimmed.to_lowercase();
    let stripped = DOI_PREFIXES
        .iter()
        .find(|prefix| lowered.starts_with(*prefix))
        .map(|prefix| &lowered[prefix.len()..])
        .unwrap_or(&lowered)
        .trim();

    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Normalize an author name for comparison (NFKC, lowercase, no punctuation)
pub fn normalize_author_name(name: &str) -> String {
    let filtered: String = name
        .nfkc()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    collapse_whitespace(&filtered)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
