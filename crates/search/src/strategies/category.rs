//! Hierarchical category filtering.
//!
//! Query categories may be slash-separated paths ("technical/rust"); a
//! query path matches a memory whose category path equals it or extends it.
//! Comparison is case-insensitive and capped at a configurable depth.

use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{MemorySearchResult, Result, SearchQuery};
use memoria_store::MemoryStore;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

use super::{fetch_candidates, finalize};

pub struct CategoryFilterStrategy {
    store: Arc<dyn MemoryStore>,
    max_depth: usize,
}

impl CategoryFilterStrategy {
    pub fn new(store: Arc<dyn MemoryStore>, max_depth: usize) -> Self {
        Self { store, max_depth }
    }

    /// Does `memory_path` fall under `query_path`?  Both are slash paths;
    /// segments beyond the depth ceiling are ignored.
    fn path_matches(&self, query_path: &str, memory_path: &str) -> bool {
        let wanted: Vec<&str> = query_path
            .split('/')
            .filter(|s| !s.is_empty())
            .take(self.max_depth)
            .collect();
        let have: Vec<&str> = memory_path
            .split('/')
            .filter(|s| !s.is_empty())
            .take(self.max_depth)
            .collect();
        if wanted.is_empty() || wanted.len() > have.len() {
            return false;
        }
        wanted
            .iter()
            .zip(have.iter())
            .all(|(w, h)| w.eq_ignore_ascii_case(h))
    }
}

/// Category path of a stored result: an explicit `category_path` in the
/// processed data wins over the flat category.
fn memory_category_path(hit: &MemorySearchResult) -> Option<String> {
    let metadata = &hit.metadata;
    if let Some(path) = metadata
        .get("processed_data")
        .and_then(|d| d.get("category_path"))
        .and_then(|v| v.as_str())
    {
        return Some(path.to_string());
    }
    metadata
        .get("category")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl SearchStrategy for CategoryFilterStrategy {
    fn name(&self) -> &'static str {
        names::CATEGORY_FILTER
    }

    fn priority(&self) -> i32 {
        default_priority(names::CATEGORY_FILTER)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::CategoryFilter]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        !query.categories.is_empty()
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let candidates =
            fetch_candidates(&self.store, query, query.text.trim(), self.name()).await?;

        let hits: Vec<MemorySearchResult> = candidates
            .into_iter()
            .filter_map(|mut hit| {
                let path = memory_category_path(&hit)?;
                let matched = query
                    .categories
                    .iter()
                    .any(|wanted| self.path_matches(wanted, &path));
                if !matched {
                    return None;
                }
                hit.score = (0.4 + hit.score * 0.6).clamp(0.0, 1.0);
                Some(hit)
            })
            .collect();

        Ok(finalize(hits, self.name(), query.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use memoria_core::{
        ImportanceLevel, MemoryCategory, MemoryClassification, ProcessedMemory, RetentionType,
    };
    use memoria_store::InMemoryStore;

    fn strategy_over(store: InMemoryStore) -> CategoryFilterStrategy {
        CategoryFilterStrategy::new(Arc::new(store), 5)
    }

    async fn seed(store: &InMemoryStore, content: &str, category: MemoryCategory) -> Result<()> {
        let processed = ProcessedMemory {
            content: content.to_string(),
            summary: content.to_string(),
            classification: MemoryClassification::Factual,
            category,
            importance: ImportanceLevel::Medium,
            entities: vec![],
            keywords: vec![],
            confidence_score: 0.9,
            classification_reason: "test".to_string(),
            related_memories: vec![],
        };
        store
            .store_processed_memory(&processed, "c", "default", RetentionType::LongTerm)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn flat_category_match_is_case_insensitive() -> Result<()> {
        let store = InMemoryStore::new();
        seed(&store, "rust ownership notes", MemoryCategory::Technical).await?;
        seed(&store, "lunch preference", MemoryCategory::Preference).await?;
        let strategy = strategy_over(store);

        let query = SearchQuery::new("", "default")
            .with_categories(vec!["Technical".to_string()]);
        let results = strategy.execute(&query).await?;
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("rust"));
        Ok(())
    }

    #[test]
    fn hierarchical_prefix_matching() {
        let strategy = CategoryFilterStrategy::new(Arc::new(InMemoryStore::new()), 5);
        assert!(strategy.path_matches("technical", "technical/rust"));
        assert!(strategy.path_matches("technical/rust", "technical/rust/async"));
        assert!(!strategy.path_matches("technical/rust", "technical"));
        assert!(!strategy.path_matches("work", "technical/rust"));
    }

    #[test]
    fn depth_ceiling_caps_comparison() {
        let strategy = CategoryFilterStrategy::new(Arc::new(InMemoryStore::new()), 2);
        // Segments past the ceiling are invisible to the comparison.
        assert!(strategy.path_matches("a/b/ignored", "a/b/other"));
    }

    #[tokio::test]
    async fn no_match_yields_empty_not_error() -> Result<()> {
        let store = InMemoryStore::new();
        seed(&store, "note", MemoryCategory::General).await?;
        let strategy = strategy_over(store);

        let query = SearchQuery::new("", "default")
            .with_categories(vec!["nonexistent".to_string()]);
        let results = strategy.execute(&query).await?;
        assert!(results.is_empty());
        Ok(())
    }
}
