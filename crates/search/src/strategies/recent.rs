//! Pure recency ranking.  Planned alone for empty query text, and the
//! terminal fallback for degraded text strategies.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use memoria_core::{MemorySearchResult, Result, SearchQuery};
use memoria_store::MemoryStore;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

use super::{fetch_candidates, finalize};

pub struct RecentSearchStrategy {
    store: Arc<dyn MemoryStore>,
}

impl RecentSearchStrategy {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }
}

/// Window-based recency score: fixed rungs for the common windows, smooth
/// decay beyond a week.
fn recency_window_score(age_seconds: i64) -> f64 {
    const HOUR: i64 = 3600;
    const DAY: i64 = 24 * HOUR;
    const WEEK: i64 = 7 * DAY;

    if age_seconds < HOUR {
        1.0
    } else if age_seconds < DAY {
        0.8
    } else if age_seconds < WEEK {
        0.6
    } else {
        let weeks = age_seconds as f64 / WEEK as f64;
        (0.6 / weeks).clamp(0.0, 0.6)
    }
}

#[async_trait]
impl SearchStrategy for RecentSearchStrategy {
    fn name(&self) -> &'static str {
        names::RECENT
    }

    fn priority(&self) -> i32 {
        default_priority(names::RECENT)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::RecencyRanking, StrategyCapability::Fallback]
    }

    fn can_handle(&self, _query: &SearchQuery) -> bool {
        // Recency results exist for any query; the planner decides when
        // this strategy runs alone versus as the terminal entry.
        true
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let candidates = fetch_candidates(&self.store, query, "", self.name()).await?;
        let now = Utc::now();

        let hits: Vec<MemorySearchResult> = candidates
            .into_iter()
            .map(|mut hit| {
                let age = (now - hit.timestamp).num_seconds().max(0);
                hit.score = recency_window_score(age);
                hit
            })
            .collect();

        Ok(finalize(hits, self.name(), query.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_rungs() {
        assert_eq!(recency_window_score(60), 1.0);
        assert_eq!(recency_window_score(2 * 3600), 0.8);
        assert_eq!(recency_window_score(3 * 24 * 3600), 0.6);
        let old = recency_window_score(30 * 24 * 3600);
        assert!(old < 0.6 && old > 0.0);
        let older = recency_window_score(90 * 24 * 3600);
        assert!(older < old, "decay must be monotonic beyond a week");
    }
}
