//! Full-text search with BM25-like term saturation and per-field weights.

use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{Error, MemorySearchResult, Result, SearchQuery};
use memoria_store::MemoryStore;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

use super::{fetch_candidates, finalize, tokenize};

/// Field weights: content dominates, summaries break ties.
const CONTENT_WEIGHT: f64 = 0.7;
const SUMMARY_WEIGHT: f64 = 0.3;
/// BM25-style saturation constant.
const K1: f64 = 1.2;
/// Bonus when the whole phrase appears verbatim in the content.
const PHRASE_BONUS: f64 = 0.15;

pub struct FtsSearchStrategy {
    store: Arc<dyn MemoryStore>,
}

impl FtsSearchStrategy {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

fn term_frequency(field: &str, term: &str) -> usize {
    field
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| *t == term)
        .count()
}

fn field_score(field: &str, terms: &[String]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let saturated: f64 = terms
        .iter()
        .map(|term| {
            let tf = term_frequency(field, term) as f64;
            tf / (tf + K1)
        })
        .sum();
    saturated / terms.len() as f64
}

#[async_trait]
impl SearchStrategy for FtsSearchStrategy {
    fn name(&self) -> &'static str {
        names::FTS
    }

    fn priority(&self) -> i32 {
        default_priority(names::FTS)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::TextSearch]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        !query.text.trim().is_empty()
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let text = query.text.trim();
        if text.is_empty() {
            return Err(Error::strategy(
                self.name(),
                Error::Validation("full-text search requires query text".to_string()),
            ));
        }

        let terms: Vec<String> = tokenize(text).into_iter().collect();
        let phrase = text.to_lowercase();
        let is_multiword = text.split_whitespace().count() >= 2;

        let candidates = fetch_candidates(&self.store, query, text, self.name()).await?;
        let hits: Vec<MemorySearchResult> = candidates
            .into_iter()
            .filter_map(|mut hit| {
                let mut score = field_score(&hit.content, &terms) * CONTENT_WEIGHT
                    + field_score(&hit.summary, &terms) * SUMMARY_WEIGHT;
                // Longer queries rank verbatim phrase matches higher.
                if is_multiword && hit.content.to_lowercase().contains(&phrase) {
                    score += PHRASE_BONUS;
                }
                if score <= 0.0 {
                    return None;
                }
                hit.score = score;
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

    async fn seed(store: &InMemoryStore, content: &str, summary: &str) -> Result<String> {
        let processed = ProcessedMemory {
            content: content.to_string(),
            summary: summary.to_string(),
            classification: MemoryClassification::Factual,
            category: MemoryCategory::Technical,
            importance: ImportanceLevel::Medium,
            entities: vec![],
            keywords: vec![],
            confidence_score: 0.9,
            classification_reason: "test".to_string(),
            related_memories: vec![],
        };
        Ok(store
            .store_processed_memory(&processed, "c", "default", RetentionType::LongTerm)
            .await?)
    }

    #[tokio::test]
    async fn phrase_match_outranks_scattered_terms() -> Result<()> {
        let store = InMemoryStore::new();
        let phrase_id = seed(
            &store,
            "the async runtime scheduler handles task wakeups",
            "scheduler notes",
        )
        .await?;
        seed(
            &store,
            "runtime errors happen when the async task panics in the scheduler queue",
            "error notes",
        )
        .await?;

        let strategy = FtsSearchStrategy::new(Arc::new(store));
        let query = SearchQuery::new("async runtime scheduler", "default");
        let results = strategy.execute(&query).await?;

        assert!(results.len() >= 2);
        assert_eq!(results[0].id, phrase_id);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_terms_saturate() -> Result<()> {
        let store = InMemoryStore::new();
        seed(&store, "tokio tokio tokio tokio tokio", "spam").await?;
        seed(&store, "tokio powers the async runtime", "real").await?;

        let strategy = FtsSearchStrategy::new(Arc::new(store));
        let results = strategy
            .execute(&SearchQuery::new("tokio", "default"))
            .await?;

        // Saturation keeps the spammy entry from scoring runaway high: five
        // repetitions buy less than a 2x lead over a single occurrence.
        assert_eq!(results.len(), 2);
        assert!(
            results[0].score < results[1].score * 2.0,
            "tf saturation should bound the gap: {} vs {}",
            results[0].score,
            results[1].score
        );
        Ok(())
    }

    #[tokio::test]
    async fn scores_stay_in_unit_interval() -> Result<()> {
        let store = InMemoryStore::new();
        seed(&store, "alpha beta gamma alpha beta", "alpha beta").await?;

        let strategy = FtsSearchStrategy::new(Arc::new(store));
        let results = strategy
            .execute(&SearchQuery::new("alpha beta gamma", "default"))
            .await?;
        for hit in &results {
            assert!((0.0..=1.0).contains(&hit.score));
        }
        Ok(())
    }
}
