//! Metadata filtering: dot-path lookups into the opaque metadata map.

use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::filter::lookup_path;
use memoria_core::{Error, MemorySearchResult, Result, SearchQuery};
use memoria_store::MemoryStore;
use serde_json::Value;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

use super::{fetch_candidates, finalize};

pub struct MetadataFilterStrategy {
    store: Arc<dyn MemoryStore>,
    max_depth: usize,
    validate_types: bool,
}

impl MetadataFilterStrategy {
    pub fn new(store: Arc<dyn MemoryStore>, max_depth: usize) -> Self {
        Self { store, max_depth, validate_types: true }
    }

    pub fn with_type_validation(mut self, validate_types: bool) -> Self {
        self.validate_types = validate_types;
        self
    }

    fn check_paths(&self, filters: &Value) -> Result<()> {
        let object = filters.as_object().ok_or_else(|| {
            Error::Validation("metadata filters must be a JSON object".to_string())
        })?;
        for path in object.keys() {
            let depth = path.split('.').count();
            if depth > self.max_depth {
                return Err(Error::Validation(format!(
                    "metadata path '{path}' exceeds depth ceiling {}",
                    self.max_depth
                )));
            }
        }
        Ok(())
    }

    fn same_json_type(a: &Value, b: &Value) -> bool {
        std::mem::discriminant(a) == std::mem::discriminant(b)
    }

    fn entry_matches(&self, metadata: &Value, path: &str, expected: &Value) -> bool {
        match lookup_path(metadata, path) {
            Some(found) => {
                if self.validate_types && !Self::same_json_type(found, expected) {
                    return false;
                }
                found == expected
            }
            None => false,
        }
    }
}

#[async_trait]
impl SearchStrategy for MetadataFilterStrategy {
    fn name(&self) -> &'static str {
        names::METADATA_FILTER
    }

    fn priority(&self) -> i32 {
        default_priority(names::METADATA_FILTER)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::MetadataFilter]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.metadata_filters.is_some()
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let Some(filters) = &query.metadata_filters else {
            return Err(Error::strategy(
                self.name(),
                Error::Validation("metadata filter strategy requires filters".to_string()),
            ));
        };
        self.check_paths(filters)
            .map_err(|err| Error::strategy(self.name(), err))?;
        let entries: Vec<(&String, &Value)> = filters
            .as_object()
            .expect("check_paths verified the object shape")
            .iter()
            .collect();

        let candidates =
            fetch_candidates(&self.store, query, query.text.trim(), self.name()).await?;
        let hits: Vec<MemorySearchResult> = candidates
            .into_iter()
            .filter(|hit| {
                entries
                    .iter()
                    .all(|(path, expected)| self.entry_matches(&hit.metadata, path, expected))
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
    use serde_json::json;

    async fn seeded() -> Result<Arc<dyn MemoryStore>> {
        let store = InMemoryStore::new();
        for (content, category) in [
            ("rust borrow checker notes", MemoryCategory::Technical),
            ("team offsite plans", MemoryCategory::Work),
        ] {
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
        }
        Ok(Arc::new(store))
    }

    #[tokio::test]
    async fn filters_on_top_level_metadata() -> Result<()> {
        let store = seeded().await?;
        let strategy = MetadataFilterStrategy::new(store, 10);

        let mut query = SearchQuery::new("", "default");
        query.metadata_filters = Some(json!({ "category": "technical" }));
        let results = strategy.execute(&query).await?;
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("rust"));
        Ok(())
    }

    #[tokio::test]
    async fn nested_path_lookup() -> Result<()> {
        let store = seeded().await?;
        let strategy = MetadataFilterStrategy::new(store, 10);

        let mut query = SearchQuery::new("", "default");
        query.metadata_filters = Some(json!({ "processed_data.chat_id": "c" }));
        let results = strategy.execute(&query).await?;
        assert_eq!(results.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn depth_ceiling_is_enforced() -> Result<()> {
        let store = seeded().await?;
        let strategy = MetadataFilterStrategy::new(store, 2);

        let mut query = SearchQuery::new("", "default");
        query.metadata_filters = Some(json!({ "a.b.c.d": 1 }));
        let err = strategy.execute(&query).await.unwrap_err();
        assert!(matches!(err, Error::Strategy { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn type_validation_excludes_mismatches() -> Result<()> {
        let store = seeded().await?;
        let strategy = MetadataFilterStrategy::new(store, 10);

        let mut query = SearchQuery::new("", "default");
        // category is a string in metadata; a numeric expectation matches nothing.
        query.metadata_filters = Some(json!({ "category": 42 }));
        let results = strategy.execute(&query).await?;
        assert!(results.is_empty());
        Ok(())
    }
}
