//! Query planning and dispatch across the strategy set.
//!
//! One query flows through: sanitize → plan → guarded execution (circuit
//! breaker, soft timeout, retry, fallback) → first-seen dedupe → filter
//! expression → composite ranking.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use memoria_config::MemoriaConfig;
use memoria_core::{Error, MemorySearchResult, Result, SearchQuery};
use memoria_store::MemoryStore;
use tracing::{debug, warn};

use crate::error_handler::StrategyErrorHandler;
use crate::stats::SearchStatistics;
use crate::strategies::{
    CategoryFilterStrategy, FtsSearchStrategy, LikeSearchStrategy, MetadataFilterStrategy,
    RecentSearchStrategy, RelationshipSearchStrategy, SemanticSearchStrategy,
    TemporalFilterStrategy,
};
use crate::strategy::{names, SearchStrategy};
use crate::validation::sanitize_query;

/// Boost applied when the query text appears verbatim in a result.
const VERBATIM_BOOST: f64 = 1.2;

/// Degradation chain: `fts → like`, `like → recent`, anything else drops to
/// `recent`.
fn fallback_for(strategy: &str) -> &'static str {
    match strategy {
        names::FTS => names::LIKE,
        names::LIKE => names::RECENT,
        _ => names::RECENT,
    }
}

pub struct SearchOrchestrator {
    strategies: Vec<Arc<dyn SearchStrategy>>,
    handler: StrategyErrorHandler,
    stats: SearchStatistics,
    strategy_timeout: Duration,
}

impl SearchOrchestrator {
    /// Full default strategy set over one store.
    pub fn new(store: Arc<dyn MemoryStore>, config: &MemoriaConfig) -> Self {
        let strategies: Vec<Arc<dyn SearchStrategy>> = vec![
            Arc::new(FtsSearchStrategy::new(Arc::clone(&store))),
            Arc::new(
                LikeSearchStrategy::new(Arc::clone(&store))
                    .with_case_sensitive(config.search.like_case_sensitive),
            ),
            Arc::new(RecentSearchStrategy::new(Arc::clone(&store))),
            Arc::new(SemanticSearchStrategy::new(Arc::clone(&store))),
            Arc::new(CategoryFilterStrategy::new(
                Arc::clone(&store),
                config.search.max_category_depth,
            )),
            Arc::new(TemporalFilterStrategy::new(
                Arc::clone(&store),
                config.search.temporal_confidence_threshold,
            )),
            Arc::new(MetadataFilterStrategy::new(
                Arc::clone(&store),
                config.search.max_metadata_depth,
            )),
            Arc::new(RelationshipSearchStrategy::new(
                store,
                config.traversal.clone(),
            )),
        ];
        Self::with_strategies(
            strategies,
            StrategyErrorHandler::new(config.circuit_breaker.clone()),
            Duration::from_millis(config.search.strategy_timeout_ms),
        )
    }

    /// Custom strategy set; used by tests and by embedders that bring their
    /// own strategies.
    pub fn with_strategies(
        strategies: Vec<Arc<dyn SearchStrategy>>,
        handler: StrategyErrorHandler,
        strategy_timeout: Duration,
    ) -> Self {
        Self {
            strategies,
            handler,
            stats: SearchStatistics::new(),
            strategy_timeout,
        }
    }

    pub fn error_handler(&self) -> &StrategyErrorHandler {
        &self.handler
    }

    pub fn statistics(&self) -> &SearchStatistics {
        &self.stats
    }

    fn strategy_by_name(&self, name: &str) -> Option<&Arc<dyn SearchStrategy>> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    /// Build the execution plan for one query.
    ///
    /// Empty text (without traversal parameters) short-circuits to `recent`.
    /// Otherwise: strategies admitted by `can_handle`, priority-descending,
    /// with the filter strategies placed explicitly — category first,
    /// temporal and metadata after the primaries, semantic for complex
    /// queries, and `like` always last.
    fn plan(&self, query: &SearchQuery) -> Vec<Arc<dyn SearchStrategy>> {
        let placed_explicitly = [
            names::CATEGORY_FILTER,
            names::TEMPORAL_FILTER,
            names::METADATA_FILTER,
            names::SEMANTIC,
            names::LIKE,
            names::RECENT,
        ];

        if query.text.trim().is_empty() && query.relationship.is_none() {
            return self
                .strategy_by_name(names::RECENT)
                .into_iter()
                .cloned()
                .collect();
        }

        let mut primaries: Vec<&Arc<dyn SearchStrategy>> = self
            .strategies
            .iter()
            .filter(|s| !placed_explicitly.contains(&s.name()))
            .filter(|s| s.can_handle(query))
            .collect();
        primaries.sort_by_key(|s| std::cmp::Reverse(s.priority()));

        let mut ordered: Vec<Arc<dyn SearchStrategy>> =
            primaries.into_iter().cloned().collect();

        if !query.categories.is_empty() {
            if let Some(category) = self.strategy_by_name(names::CATEGORY_FILTER) {
                ordered.insert(0, Arc::clone(category));
            }
        }
        if !query.temporal.is_empty() {
            if let Some(temporal) = self.strategy_by_name(names::TEMPORAL_FILTER) {
                ordered.push(Arc::clone(temporal));
            }
        }
        if query.metadata_filters.is_some() {
            if let Some(metadata) = self.strategy_by_name(names::METADATA_FILTER) {
                ordered.push(Arc::clone(metadata));
            }
        }
        if query.is_complex() {
            if let Some(semantic) = self.strategy_by_name(names::SEMANTIC) {
                ordered.push(Arc::clone(semantic));
            }
        }
        if let Some(like) = self.strategy_by_name(names::LIKE) {
            if like.can_handle(query) {
                ordered.push(Arc::clone(like));
            }
        }
        // Recent closes every plan: the terminal rung of the degradation
        // chain, reached only when earlier strategies left the limit unmet.
        if let Some(recent) = self.strategy_by_name(names::RECENT) {
            ordered.push(Arc::clone(recent));
        }

        // A strategy appears once, at its earliest position.
        let mut seen = HashSet::new();
        ordered.retain(|s| seen.insert(s.name()));
        ordered
    }

    /// One timed execution; counts into the per-strategy statistics.
    async fn execute_once(
        &self,
        strategy: &Arc<dyn SearchStrategy>,
        query: &SearchQuery,
    ) -> Result<Vec<MemorySearchResult>> {
        let name = strategy.name();
        let started = Instant::now();
        let outcome = tokio::time::timeout(self.strategy_timeout, strategy.execute(query)).await;
        let elapsed = started.elapsed();
        match outcome {
            Ok(Ok(hits)) => {
                self.stats.record_execution(name, elapsed, hits.len());
                Ok(hits)
            }
            Ok(Err(err)) => {
                self.stats.record_failure(name, elapsed);
                Err(err)
            }
            Err(_) => {
                self.stats.record_failure(name, elapsed);
                Err(Error::strategy(
                    name,
                    Error::Timeout(self.strategy_timeout.as_millis() as u64),
                ))
            }
        }
    }

    /// Execute with retry; the breaker sees at most one failure per call.
    async fn execute_with_retry(
        &self,
        strategy: &Arc<dyn SearchStrategy>,
        query: &SearchQuery,
    ) -> Result<Vec<MemorySearchResult>> {
        let name = strategy.name();
        match self.execute_once(strategy, query).await {
            Ok(hits) => {
                self.handler.record_success(name);
                Ok(hits)
            }
            Err(err) if self.handler.should_retry(&err) => {
                debug!(strategy = name, error = %err, "transient failure, retrying once");
                match self.execute_once(strategy, query).await {
                    Ok(hits) => {
                        self.handler.record_success(name);
                        Ok(hits)
                    }
                    Err(retry_err) => {
                        self.handler.record_failure(name, &retry_err);
                        Err(retry_err)
                    }
                }
            }
            Err(err) => {
                self.handler.record_failure(name, &err);
                Err(err)
            }
        }
    }

    /// Orchestrated search: plan, dispatch, dedupe, filter, rank.
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let mut query = query;
        sanitize_query(&mut query)?;

        // Strategies cap their output at the query limit; widen the window
        // so the offset skip still leaves a full page.
        let page_limit = query.limit;
        query.limit += query.offset;

        let plan = self.plan(&query);
        debug!(
            strategies = ?plan.iter().map(|s| s.name()).collect::<Vec<_>>(),
            text_len = query.text.len(),
            "search plan built"
        );

        let mut results: Vec<MemorySearchResult> = Vec::new();
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut executed: HashSet<&'static str> = HashSet::new();

        for strategy in &plan {
            if results.len() >= query.limit {
                break;
            }
            let name = strategy.name();
            if executed.contains(name) {
                continue;
            }
            if !self.handler.allow(name) {
                debug!(strategy = name, "circuit open, strategy skipped");
                continue;
            }
            executed.insert(name);

            match self.execute_with_retry(strategy, &query).await {
                Ok(hits) => merge_deduped(&mut results, &mut seen_ids, hits),
                Err(err) => {
                    warn!(strategy = name, error = %err, "strategy failed, continuing plan");
                    if self.handler.should_fallback(name, false) {
                        let fallback_name = fallback_for(name);
                        if !executed.contains(fallback_name) {
                            if let Some(fallback) = self.strategy_by_name(fallback_name) {
                                if self.handler.allow(fallback_name) {
                                    executed.insert(fallback.name());
                                    match self.execute_with_retry(fallback, &query).await {
                                        Ok(hits) => {
                                            debug!(
                                                strategy = name,
                                                fallback = fallback_name,
                                                "fallback produced results"
                                            );
                                            merge_deduped(&mut results, &mut seen_ids, hits);
                                        }
                                        Err(fb_err) => warn!(
                                            fallback = fallback_name,
                                            error = %fb_err,
                                            "fallback failed too"
                                        ),
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        let results = self.apply_filter_expression(&query, results);
        query.limit = page_limit;
        Ok(self.rank(&query, results))
    }

    /// Strict single-strategy search: the named strategy's failure is
    /// surfaced after one retry, never degraded.
    pub async fn search_with_strategy(
        &self,
        name: &str,
        query: SearchQuery,
    ) -> Result<Vec<MemorySearchResult>> {
        let mut query = query;
        sanitize_query(&mut query)?;

        let strategy = self
            .strategy_by_name(name)
            .ok_or_else(|| Error::Validation(format!("unknown strategy '{name}'")))?
            .clone();
        if !self.handler.allow(strategy.name()) {
            return Err(Error::strategy(
                strategy.name(),
                Error::Storage("circuit is open".to_string()),
            ));
        }

        let mut results = self.execute_with_retry(&strategy, &query).await?;
        if !query.include_metadata {
            for result in &mut results {
                result.metadata = serde_json::Value::Null;
            }
        }
        Ok(results)
    }

    fn apply_filter_expression(
        &self,
        query: &SearchQuery,
        results: Vec<MemorySearchResult>,
    ) -> Vec<MemorySearchResult> {
        let Some(filter) = &query.filter else {
            return results;
        };
        let mut kept = Vec::with_capacity(results.len());
        for result in &results {
            match filter.matches(&result.metadata) {
                Ok(true) => kept.push(result.clone()),
                Ok(false) => {}
                Err(err) => {
                    // A broken filter must not cost the caller their
                    // results: log and return the unfiltered set.
                    warn!(error = %err, "filter expression failed, returning unfiltered results");
                    return results;
                }
            }
        }
        kept
    }

    /// Composite ranking: base score × (1 + priority/100), with a verbatim
    /// text boost; sort descending, apply offset, truncate.
    fn rank(&self, query: &SearchQuery, results: Vec<MemorySearchResult>) -> Vec<MemorySearchResult> {
        let mut ranked: Vec<(f64, MemorySearchResult)> = results
            .into_iter()
            .map(|result| {
                let priority = self
                    .strategy_by_name(&result.strategy)
                    .map(|s| s.priority())
                    .unwrap_or(0);
                let mut composite = result.score * (1.0 + f64::from(priority) / 100.0);
                if !query.text.is_empty() && result.content.contains(&query.text) {
                    composite *= VERBATIM_BOOST;
                }
                (composite, result)
            })
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut output: Vec<MemorySearchResult> = ranked
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .map(|(_, result)| result)
            .collect();
        if !query.include_metadata {
            for result in &mut output {
                result.metadata = serde_json::Value::Null;
            }
        }
        output
    }
}

fn merge_deduped(
    results: &mut Vec<MemorySearchResult>,
    seen_ids: &mut HashSet<String>,
    hits: Vec<MemorySearchResult>,
) {
    for hit in hits {
        // First-seen wins: an earlier strategy's view of a memory is kept.
        if seen_ids.insert(hit.id.clone()) {
            results.push(hit);
        }
    }
}
