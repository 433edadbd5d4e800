use serde::{Deserialize, Serialize};

use crate::filter::FilterExpression;
use crate::schema::{MinImportance, RelationshipType};

/// Hard bounds enforced by query validation.
pub const MAX_QUERY_TEXT_LEN: usize = 1000;
pub const MAX_RESULT_LIMIT: usize = 1000;
pub const MAX_RESULT_OFFSET: usize = 10_000;
pub const MAX_CATEGORY_LEN: usize = 100;
pub const MAX_METADATA_FILTER_BYTES: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Case-insensitive parse; anything other than `asc`/`desc` is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Ordering discipline for the relationship traversal frontier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStrategy {
    Bfs,
    Dfs,
    StrengthWeighted,
}

/// Relationship-traversal parameters carried by a search query.
///
/// Exactly one of `start_memory_id` / `target_memory_id` must be set:
/// a start id walks outbound edges, a target id walks inbound edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipParams {
    pub start_memory_id: Option<String>,
    pub target_memory_id: Option<String>,
    /// Empty means all edge types.
    #[serde(default)]
    pub relationship_types: Vec<RelationshipType>,
    pub max_depth: usize,
    pub min_strength: f64,
    pub min_confidence: f64,
    pub traversal: TraversalStrategy,
    pub include_paths: bool,
}

impl Default for RelationshipParams {
    fn default() -> Self {
        Self {
            start_memory_id: None,
            target_memory_id: None,
            relationship_types: Vec::new(),
            max_depth: 2,
            min_strength: 0.0,
            min_confidence: 0.0,
            traversal: TraversalStrategy::Bfs,
            include_paths: false,
        }
    }
}

/// Raw temporal constraints prior to parsing.  Absolute bounds are RFC 3339
/// strings; `natural_language` carries free-form phrases ("yesterday",
/// "last week") resolved by the temporal strategy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemporalBounds {
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub natural_language: Option<String>,
}

impl TemporalBounds {
    pub fn is_empty(&self) -> bool {
        self.created_after.is_none()
            && self.created_before.is_none()
            && self.since.is_none()
            && self.until.is_none()
            && self.natural_language.is_none()
    }
}

/// A search request as accepted by the orchestrator.
///
/// The orchestrator sanitizes and validates every field before any strategy
/// runs; strategies may assume the bounds above hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub namespace: String,
    pub limit: usize,
    pub offset: usize,
    #[serde(default)]
    pub categories: Vec<String>,
    pub min_importance: MinImportance,
    #[serde(default)]
    pub temporal: TemporalBounds,
    /// Raw metadata filter object (validated as parseable JSON ≤ 10 KB).
    pub metadata_filters: Option<serde_json::Value>,
    pub sort_direction: SortDirection,
    pub include_metadata: bool,
    pub filter: Option<FilterExpression>,
    pub relationship: Option<RelationshipParams>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            namespace: namespace.into(),
            limit: 10,
            offset: 0,
            categories: Vec::new(),
            min_importance: MinImportance::All,
            temporal: TemporalBounds::default(),
            metadata_filters: None,
            sort_direction: SortDirection::Desc,
            include_metadata: true,
            filter: None,
            relationship: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_relationship(mut self, params: RelationshipParams) -> Self {
        self.relationship = Some(params);
        self
    }

    /// Word count of the query text.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// A query is "complex" when it has ≥ 6 words or > 100 characters;
    /// complex queries additionally get the semantic strategy.
    pub fn is_complex(&self) -> bool {
        self.word_count() >= 6 || self.text.chars().count() > 100
    }
}
