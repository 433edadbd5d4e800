//! Bounded graph traversal over the directed relationship multigraph.
//!
//! The frontier carries cumulative strength/confidence products; cycles are
//! caught by path inspection at dequeue time, so the graph itself may be
//! cyclic.  Three ordering disciplines share one enqueue path — duplicate
//! suppression lives solely in the visited set.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use memoria_config::TraversalConfig;
use memoria_core::{
    Error, Memory, MemorySearchResult, RelationshipContext, RelationshipParams, Result,
    SearchQuery, TraversalStrategy,
};
use memoria_store::{EdgeDirection, MemoryStore, RelatedMemoriesOptions};
use tracing::debug;

use crate::strategy::{default_priority, names, SearchStrategy, StrategyCapability};

/// Fixed per-hop score penalty: closer edges dominate.
const DEPTH_PENALTY: f64 = 0.8;

#[derive(Debug, Clone)]
struct Frontier {
    memory_id: String,
    depth: usize,
    path: Vec<String>,
    cumulative_strength: f64,
    cumulative_confidence: f64,
}

pub struct RelationshipSearchStrategy {
    store: Arc<dyn MemoryStore>,
    config: TraversalConfig,
}

impl RelationshipSearchStrategy {
    pub fn new(store: Arc<dyn MemoryStore>, config: TraversalConfig) -> Self {
        Self { store, config }
    }

    fn validate(&self, params: &RelationshipParams) -> Result<()> {
        let endpoints =
            usize::from(params.start_memory_id.is_some()) + usize::from(params.target_memory_id.is_some());
        if endpoints != 1 {
            return Err(Error::Validation(
                "exactly one of start_memory_id / target_memory_id must be set".to_string(),
            ));
        }
        if params.max_depth > self.config.max_traversal_depth {
            return Err(Error::Validation(format!(
                "max_depth {} exceeds the traversal ceiling {}",
                params.max_depth, self.config.max_traversal_depth
            )));
        }
        for (label, value) in [
            ("min_strength", params.min_strength),
            ("min_confidence", params.min_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Validation(format!("{label} must be within [0, 1]")));
            }
        }
        Ok(())
    }

    fn frontier_weight(&self, entry: &Frontier) -> f64 {
        self.config.strength_weight * entry.cumulative_strength
            + self.config.confidence_weight * entry.cumulative_confidence
    }

    fn enqueue(&self, queue: &mut VecDeque<Frontier>, entry: Frontier, discipline: TraversalStrategy) {
        match discipline {
            TraversalStrategy::Bfs => queue.push_back(entry),
            TraversalStrategy::Dfs => queue.push_front(entry),
            TraversalStrategy::StrengthWeighted => {
                queue.push_back(entry);
                let mut drained: Vec<Frontier> = queue.drain(..).collect();
                drained.sort_by(|a, b| {
                    self.frontier_weight(b).total_cmp(&self.frontier_weight(a))
                });
                queue.extend(drained);
            }
        }
    }

    fn score(&self, entry: &Frontier) -> f64 {
        (self.frontier_weight(entry) * DEPTH_PENALTY.powi(entry.depth as i32)).clamp(0.0, 1.0)
    }

    fn emit(&self, memory: &Memory, entry: &Frontier, include_paths: bool) -> MemorySearchResult {
        MemorySearchResult {
            id: memory.id.clone(),
            content: memory.content.clone(),
            summary: memory.summary.clone(),
            metadata: serde_json::json!({
                "category": memory.category.as_str(),
                "importance": memory.importance.as_str(),
                "classification": memory.classification,
                "namespace": memory.namespace,
            }),
            score: self.score(entry),
            strategy: names::RELATIONSHIP.to_string(),
            timestamp: memory.created_at,
            relationship: Some(RelationshipContext {
                path: include_paths.then(|| entry.path.clone()),
                distance: entry.depth,
                connection_strength: entry.cumulative_strength,
                related_entities: memory.entities.clone(),
            }),
        }
    }

    async fn traverse(
        &self,
        query: &SearchQuery,
        params: &RelationshipParams,
    ) -> Result<Vec<MemorySearchResult>> {
        // A zero-depth traversal has nothing to visit: the origin itself is
        // never emitted.
        if params.max_depth == 0 {
            return Ok(Vec::new());
        }

        let (origin, direction) = match (&params.start_memory_id, &params.target_memory_id) {
            (Some(start), None) => (start.clone(), EdgeDirection::Outbound),
            (None, Some(target)) => (target.clone(), EdgeDirection::Inbound),
            _ => unreachable!("validated before traversal"),
        };

        let adjacency = RelatedMemoriesOptions {
            namespace: query.namespace.clone(),
            relationship_types: params.relationship_types.clone(),
            min_confidence: params.min_confidence,
            min_strength: params.min_strength,
            direction,
            limit: self.config.max_relationships_per_node,
        };

        let mut queue: VecDeque<Frontier> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut results: Vec<MemorySearchResult> = Vec::new();

        queue.push_back(Frontier {
            memory_id: origin.clone(),
            depth: 0,
            path: vec![origin],
            cumulative_strength: 1.0,
            cumulative_confidence: 1.0,
        });

        while let Some(entry) = queue.pop_front() {
            if results.len() >= query.limit {
                break;
            }
            if visited.contains(&entry.memory_id) {
                continue;
            }
            if has_repeated_id(&entry.path) {
                continue;
            }
            visited.insert(entry.memory_id.clone());

            if entry.depth > 0 {
                let Some(memory) = self.store.get_memory_by_id(&entry.memory_id).await? else {
                    continue;
                };
                results.push(self.emit(&memory, &entry, params.include_paths));
            }

            if entry.depth < params.max_depth {
                let neighbors = self
                    .store
                    .get_related_memories(&entry.memory_id, &adjacency)
                    .await?;
                for related in neighbors {
                    let neighbor_id = related.memory.id.clone();
                    let mut path = entry.path.clone();
                    path.push(neighbor_id.clone());
                    self.enqueue(
                        &mut queue,
                        Frontier {
                            memory_id: neighbor_id,
                            depth: entry.depth + 1,
                            path,
                            cumulative_strength: entry.cumulative_strength
                                * related.relationship.strength,
                            cumulative_confidence: entry.cumulative_confidence
                                * related.relationship.confidence,
                        },
                        params.traversal,
                    );
                }
            }
        }

        debug!(
            emitted = results.len(),
            visited = visited.len(),
            "relationship traversal finished"
        );
        Ok(results)
    }
}

fn has_repeated_id(path: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(path.len());
    path.iter().any(|id| !seen.insert(id))
}

#[async_trait]
impl SearchStrategy for RelationshipSearchStrategy {
    fn name(&self) -> &'static str {
        names::RELATIONSHIP
    }

    fn priority(&self) -> i32 {
        default_priority(names::RELATIONSHIP)
    }

    fn capabilities(&self) -> &'static [StrategyCapability] {
        &[StrategyCapability::GraphTraversal]
    }

    fn can_handle(&self, query: &SearchQuery) -> bool {
        query.relationship.is_some()
    }

    async fn execute(&self, query: &SearchQuery) -> Result<Vec<MemorySearchResult>> {
        let Some(params) = &query.relationship else {
            return Err(Error::strategy(
                self.name(),
                Error::Validation("relationship search requires traversal parameters".to_string()),
            ));
        };
        self.validate(params)
            .map_err(|err| Error::strategy(self.name(), err))?;
        self.traverse(query, params)
            .await
            .map_err(|err| match err {
                wrapped @ Error::Strategy { .. } => wrapped,
                other => Error::strategy(self.name(), other),
            })
    }
}
