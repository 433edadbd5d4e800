pub mod category;
pub mod fts;
pub mod like;
pub mod metadata;
pub mod recent;
pub mod relationship;
pub mod semantic;
pub mod temporal;

pub use category::CategoryFilterStrategy;
pub use fts::FtsSearchStrategy;
pub use like::LikeSearchStrategy;
pub use metadata::MetadataFilterStrategy;
pub use recent::RecentSearchStrategy;
pub use relationship::RelationshipSearchStrategy;
pub use semantic::{EmbedFn, SemanticSearchStrategy};
pub use temporal::TemporalFilterStrategy;

use std::collections::BTreeSet;
use std::sync::Arc;

use memoria_core::{Error, MemorySearchResult, Result, SearchQuery};
use memoria_store::{MemoryStore, StoreSearchOptions};

/// How many store rows a filtering strategy inspects before applying its
/// own predicate.  Bounded so no strategy walks an unbounded table.
pub(crate) const CANDIDATE_WINDOW: usize = 500;

/// Fetch a candidate window from the store for `query`, using `text` as the
/// store-level search text ("" means recency-ordered).
pub(crate) async fn fetch_candidates(
    store: &Arc<dyn MemoryStore>,
    query: &SearchQuery,
    text: &str,
    strategy_name: &'static str,
) -> Result<Vec<MemorySearchResult>> {
    let options = StoreSearchOptions {
        namespace: query.namespace.clone(),
        limit: CANDIDATE_WINDOW.max(query.limit + query.offset),
        min_importance: query.min_importance,
        categories: Vec::new(),
        include_metadata: true,
    };
    store
        .search_memories(text, &options)
        .await
        .map_err(|err| Error::strategy(strategy_name, err))
}

/// Tag `results` with `strategy_name` and cap them at the query limit.
pub(crate) fn finalize(
    mut results: Vec<MemorySearchResult>,
    strategy_name: &str,
    limit: usize,
) -> Vec<MemorySearchResult> {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(limit);
    for result in &mut results {
        result.strategy = strategy_name.to_string();
        result.score = result.score.clamp(0.0, 1.0);
    }
    results
}

/// Lowercased alphanumeric terms of length ≥ 3.
pub(crate) fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .collect()
}
