//! The uniform contract every search strategy honors.

use async_trait::async_trait;
use memoria_core::{MemorySearchResult, Result, RetentionType, SearchQuery};

/// Strategy names the orchestrator knows.  Used for planning, fallback
/// mapping, and per-strategy circuit tracking.
pub mod names {
    pub const FTS: &str = "fts";
    pub const LIKE: &str = "like";
    pub const RECENT: &str = "recent";
    pub const SEMANTIC: &str = "semantic";
    pub const CATEGORY_FILTER: &str = "category_filter";
    pub const TEMPORAL_FILTER: &str = "temporal_filter";
    pub const METADATA_FILTER: &str = "metadata_filter";
    pub const RELATIONSHIP: &str = "relationship";
}

/// What a strategy is able to do; advisory metadata surfaced to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyCapability {
    TextSearch,
    RecencyRanking,
    CategoryFilter,
    TemporalFilter,
    MetadataFilter,
    SemanticSimilarity,
    GraphTraversal,
    Fallback,
}

/// A pluggable query executor.
///
/// `can_handle` must stay pure and cheap — it only answers whether the
/// strategy has any chance of producing useful results.  `execute` returns
/// at most `query.limit` results and wraps every lower failure in strategy
/// context (`Error::Strategy`) rather than swallowing it.
#[async_trait]
pub trait SearchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Planning priority; higher runs earlier and boosts ranking.
    fn priority(&self) -> i32;

    fn supported_memory_types(&self) -> &'static [RetentionType] {
        &[
            RetentionType::ShortTerm,
            RetentionType::LongTerm,
            RetentionType::Conscious,
        ]
    }

    fn capabilities(&self) -> &'static [StrategyCapability];

    fn can_handle(&self, query: &SearchQuery) -> bool;

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>>;
}

/// Default planning priorities.  `recent` sits at the bottom so pure
/// recency hits never outrank deduped text matches.
pub fn default_priority(name: &str) -> i32 {
    match name {
        names::FTS => 100,
        names::LIKE => 80,
        names::SEMANTIC => 70,
        names::CATEGORY_FILTER => 60,
        names::TEMPORAL_FILTER => 50,
        names::METADATA_FILTER => 45,
        names::RELATIONSHIP => 40,
        names::RECENT => 5,
        _ => 0,
    }
}
