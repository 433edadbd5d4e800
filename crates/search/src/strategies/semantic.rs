//! Semantic similarity strategy.
//!
//! Embedding computation is delegated: when an embed hook is configured the
//! query and each candidate are embedded and ranked by cosine similarity;
//! without one, a token-set Jaccard similarity stands in so the strategy
//! stays contract-compatible.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{MemorySearchResult, Result, SearchQuery};
use memoria_store::MemoryStore;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

use super::{fetch_candidates, finalize, tokenize};

/// An async function that maps a text string to an optional embedding
/// vector.  Stored as an `Arc` so it can be cloned across structs.
pub type EmbedFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = Option<Vec<f32>>> + Send>> + Send + Sync>;

pub struct SemanticSearchStrategy {
    store: Arc<dyn MemoryStore>,
    embed: Option<EmbedFn>,
}

impl SemanticSearchStrategy {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store, embed: None }
    }

    pub fn with_embed_fn(mut self, embed: EmbedFn) -> Self {
        self.embed = Some(embed);
        self
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    f64::from((dot / (mag_a * mag_b)).clamp(0.0, 1.0))
}

fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let left = tokenize(a);
    let right = tokenize(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let intersection = left.intersection(&right).count() as f64;
    let union = left.union(&right).count() as f64;
    intersection / union
}

#[async_trait]
impl SearchStrategy for SemanticSearchStrategy {
    fn name(&self) -> &'static str {
        names::SEMANTIC
    }

    fn priority(&self) -> i32 {
        default_priority(names::SEMANTIC)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::SemanticSimilarity]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        !query.text.trim().is_empty()
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let text = query.text.trim();
        let candidates = fetch_candidates(&self.store, query, text, self.name()).await?;

        let mut hits = Vec::with_capacity(candidates.len());
        match &self.embed {
            Some(embed) => {
                let Some(query_vec) = embed(text.to_string()).await else {
                    // Embedding backend declined; degrade to the lexical proxy.
                    return self.score_lexically(candidates, text, query.limit);
                };
                for mut hit in candidates {
                    let score = match embed(hit.content.clone()).await {
                        Some(content_vec) => cosine_similarity(&query_vec, &content_vec),
                        None => jaccard_similarity(text, &hit.content),
                    };
                    if score > 0.0 {
                        hit.score = score;
                        hits.push(hit);
                    }
                }
            }
            None => return self.score_lexically(candidates, text, query.limit),
        }

        Ok(finalize(hits, self.name(), query.limit))
    }
}

impl SemanticSearchStrategy {
    fn score_lexically(
        &self,
        candidates: Vec<MemorySearchResult>,
        text: &str,
        limit: usize,
    ) -> Result<Vec<MemorySearchResult>> {
        let hits: Vec<MemorySearchResult> = candidates
            .into_iter()
            .filter_map(|mut hit| {
                let score = jaccard_similarity(text, &hit.content);
                if score <= 0.0 {
                    return None;
                }
                hit.score = score;
                Some(hit)
            })
            .collect();
        Ok(finalize(hits, self.name(), limit))
    }
}
