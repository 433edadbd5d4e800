//! Query sanitization and validation, run before any strategy executes.

use memoria_core::{
    Error, Result, SearchQuery, MAX_CATEGORY_LEN, MAX_METADATA_FILTER_BYTES, MAX_QUERY_TEXT_LEN,
    MAX_RESULT_LIMIT, MAX_RESULT_OFFSET,
};

/// Substrings that mark a query as hostile.  Matching is case-insensitive;
/// a hit rejects the query outright rather than attempting to strip it.
const DANGEROUS_MARKERS: &[&str] = &[
    // SQL injection
    "' or ",
    "\" or ",
    "1=1",
    "union select",
    "drop table",
    "delete from",
    "insert into",
    "--",
    ";--",
    "xp_",
    // XSS
    "<script",
    "</script",
    "javascript:",
    "onerror=",
    "onload=",
    // command injection
    "$(",
    "`",
    "&&",
    "||",
    "; rm ",
];

fn contains_dangerous_marker(text: &str) -> Option<&'static str> {
    let lowered = text.to_lowercase();
    DANGEROUS_MARKERS
        .iter()
        .find(|marker| lowered.contains(**marker))
        .copied()
}

/// Sanitize in place and validate.  Rejections surface as
/// `ValidationError`; the orchestrator runs no strategy after a rejection.
pub fn sanitize_query(query: &mut SearchQuery) -> Result<()> {
    query.text = query.text.trim().to_string();

    if query.text.chars().count() > MAX_QUERY_TEXT_LEN {
        return Err(Error::Validation(format!(
            "query text exceeds {MAX_QUERY_TEXT_LEN} characters"
        )));
    }
    if let Some(marker) = contains_dangerous_marker(&query.text) {
        return Err(Error::Validation(format!(
            "query text contains a disallowed pattern ({marker:?})"
        )));
    }

    if query.limit == 0 || query.limit > MAX_RESULT_LIMIT {
        return Err(Error::Validation(format!(
            "limit must be within [1, {MAX_RESULT_LIMIT}]"
        )));
    }
    if query.offset > MAX_RESULT_OFFSET {
        return Err(Error::Validation(format!(
            "offset must be within [0, {MAX_RESULT_OFFSET}]"
        )));
    }

    // Normalize categories: trim, cap length, drop empties.
    query.categories = query
        .categories
        .iter()
        .map(|c| c.trim().chars().take(MAX_CATEGORY_LEN).collect::<String>())
        .filter(|c| !c.is_empty())
        .collect();
    for category in &query.categories {
        if let Some(marker) = contains_dangerous_marker(category) {
            return Err(Error::Validation(format!(
                "category contains a disallowed pattern ({marker:?})"
            )));
        }
    }

    if let Some(filters) = &query.metadata_filters {
        if !filters.is_object() {
            return Err(Error::Validation(
                "metadata filters must be a JSON object".to_string(),
            ));
        }
        let serialized = serde_json::to_string(filters)?;
        if serialized.len() > MAX_METADATA_FILTER_BYTES {
            return Err(Error::Validation(format!(
                "metadata filters exceed {MAX_METADATA_FILTER_BYTES} bytes"
            )));
        }
    }

    if query.namespace.trim().is_empty() {
        return Err(Error::Validation("namespace must not be empty".to_string()));
    }

    Ok(())
}
