//! Substring (LIKE) search.  The universal final fallback: cheap, always
//! applicable to non-empty query text.

use std::sync::Arc;

use async_trait::async_trait;
use memoria_core::{MemorySearchResult, Result, SearchQuery};
use memoria_store::MemoryStore;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

use super::{fetch_candidates, finalize};

pub struct LikeSearchStrategy {
    store: Arc<dyn MemoryStore>,
    case_sensitive: bool,
    allow_wildcards: bool,
}

impl LikeSearchStrategy {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self {
            store,
            case_sensitive: false,
            allow_wildcards: true,
        }
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_wildcards(mut self, allow_wildcards: bool) -> Self {
        self.allow_wildcards = allow_wildcards;
        self
    }

    fn matches(&self, haystack: &str, pattern: &str) -> bool {
        let (haystack, pattern) = if self.case_sensitive {
            (haystack.to_string(), pattern.to_string())
        } else {
            (haystack.to_lowercase(), pattern.to_lowercase())
        };

        if self.allow_wildcards && pattern.contains('%') {
            // `%` splits the pattern into segments that must appear in order.
            let mut cursor = 0usize;
            for segment in pattern.split('%').filter(|s| !s.is_empty()) {
                match haystack[cursor..].find(segment) {
                    Some(found) => cursor += found + segment.len(),
                    None => return false,
                }
            }
            true
        } else {
            haystack.contains(&pattern)
        }
    }
}

#[async_trait]
impl SearchStrategy for LikeSearchStrategy {
    fn name(&self) -> &'static str {
        names::LIKE
    }

    fn priority(&self) -> i32 {
        default_priority(names::LIKE)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::TextSearch, StrategyCapability::Fallback]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        !query.text.trim().is_empty()
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let candidates = fetch_candidates(&self.store, query, "", self.name()).await?;
        let pattern = query.text.trim();

        let hits: Vec<MemorySearchResult> = candidates
            .into_iter()
            .filter_map(|mut hit| {
                let in_content = self.matches(&hit.content, pattern);
                let in_summary = self.matches(&hit.summary, pattern);
                if !in_content && !in_summary {
                    return None;
                }
                // Content matches outrank summary-only matches; longer
                // patterns relative to the field are more specific.
                let ratio = pattern.chars().count() as f64
                    / hit.content.chars().count().max(1) as f64;
                hit.score = if in_content {
                    0.5 + (ratio * 2.0).min(0.5)
                } else {
                    0.4
                };
                Some(hit)
            })
            .collect();

        Ok(finalize(hits, self.name(), query.limit))
    }
}
