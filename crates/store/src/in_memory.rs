//! In-memory reference implementation of the store interface.
//!
//! Interior mutability through one `RwLock` keeps every write atomic with
//! respect to readers; consolidation performs all three of its writes under
//! a single guard.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use memoria_core::{
    ChatHistoryEntry, Error, Memory, MemoryRelationship, MemorySearchResult, MemoryStats,
    ProcessedMemory, RelationshipType, Result, RetentionType,
};
use std::sync::RwLock;
use tracing::debug;

use crate::store::{
    ConsolidationReport, EdgeDirection, MemoryStore, RelatedMemoriesOptions, RelatedMemory,
    StoreSearchOptions,
};

/// A persisted edge with its source side attached.
#[derive(Debug, Clone)]
struct StoredEdge {
    source_id: String,
    namespace: String,
    relationship: MemoryRelationship,
}

#[derive(Debug, Default)]
struct Inner {
    chat_history: Vec<ChatHistoryEntry>,
    chat_ids: HashSet<String>,
    processed_chat_ids: HashSet<String>,
    memories: Vec<Memory>,
    /// Maps memory id → index in `memories` for O(1) lookup.
    by_id: HashMap<String, usize>,
    /// General edges, kept apart from `supersedes` edges.
    edges: Vec<StoredEdge>,
    supersedes: Vec<StoredEdge>,
}

impl Inner {
    fn rebuild_index(&mut self) {
        self.by_id = self
            .memories
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
    }

    fn edge_tables(&self) -> impl Iterator<Item = &StoredEdge> {
        self.edges.iter().chain(self.supersedes.iter())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Direct insertion used by tests and by consolidation fixtures.
    pub fn insert_memory(&self, memory: Memory) {
        let mut inner = self.write();
        let idx = inner.memories.len();
        inner.by_id.insert(memory.id.clone(), idx);
        inner.memories.push(memory);
    }
}

fn memory_metadata(memory: &Memory) -> serde_json::Value {
    serde_json::json!({
        "category": memory.category.as_str(),
        "importance": memory.importance.as_str(),
        "classification": memory.classification,
        "entities": memory.entities,
        "keywords": memory.keywords,
        "confidence_score": memory.confidence_score,
        "retention": memory.retention,
        "namespace": memory.namespace,
        "processed_data": memory.processed_data,
    })
}

/// Common English stop words excluded from the lexical term set.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "was", "has", "are", "not", "this", "that", "with", "from", "have",
    "you", "can", "its", "will", "but", "they", "all", "been", "also", "into", "more", "than",
    "when", "who", "what", "how", "out", "our", "new", "now",
];

pub(crate) fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|t| t.len() >= 3)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

fn lexical_overlap(content: &str, query_terms: &BTreeSet<String>) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let content_terms = tokenize(content);
    let overlap = query_terms.intersection(&content_terms).count() as f64;
    overlap / query_terms.len() as f64
}

fn recency_score(now: chrono::DateTime<Utc>, created_at: chrono::DateTime<Utc>) -> f64 {
    let age_hours = (now - created_at).num_seconds().max(0) as f64 / 3600.0;
    // Half-life ~48 h — very recent memories score ≈1.0, week-old ≈0.35.
    1.0 / (1.0 + (age_hours / 48.0))
}

fn category_matches(memory: &Memory, categories: &[String]) -> bool {
    if categories.is_empty() {
        return true;
    }
    categories
        .iter()
        .any(|c| c.eq_ignore_ascii_case(memory.category.as_str()))
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store_chat_history(&self, entry: ChatHistoryEntry) -> Result<()> {
        let mut inner = self.write();
        if !inner.chat_ids.insert(entry.id.clone()) {
            debug!(id = %entry.id, "duplicate chat history entry skipped");
            return Ok(());
        }
        inner.chat_history.push(entry);
        Ok(())
    }

    async fn store_processed_memory(
        &self,
        processed: &ProcessedMemory,
        chat_id: &str,
        namespace: &str,
        retention: RetentionType,
    ) -> Result<String> {
        let id = Memory::new_id();
        let now = Utc::now();
        let mut processed_data = std::collections::BTreeMap::new();
        processed_data.insert(
            "chat_id".to_string(),
            serde_json::Value::String(chat_id.to_string()),
        );
        processed_data.insert(
            "classification_reason".to_string(),
            serde_json::Value::String(processed.classification_reason.clone()),
        );

        let memory = Memory {
            id: id.clone(),
            content: processed.content.clone(),
            summary: processed.summary.clone(),
            category: processed.category,
            importance: processed.importance,
            classification: processed.classification,
            entities: processed.entities.clone(),
            keywords: processed.keywords.clone(),
            confidence_score: processed.confidence_score.clamp(0.0, 1.0),
            retention,
            processed_data,
            namespace: namespace.to_string(),
            created_at: now,
            last_activity: now,
        };

        let mut inner = self.write();
        let idx = inner.memories.len();
        inner.by_id.insert(id.clone(), idx);
        inner.memories.push(memory);
        debug!(id = %id, chat_id, namespace, "processed memory stored");
        Ok(id)
    }

    async fn store_memory_relationships(
        &self,
        source_memory_id: &str,
        edges: &[MemoryRelationship],
        namespace: &str,
    ) -> Result<()> {
        let mut inner = self.write();
        for edge in edges {
            let stored = StoredEdge {
                source_id: source_memory_id.to_string(),
                namespace: namespace.to_string(),
                relationship: edge.clone(),
            };
            // Supersedes edges are queried distinctly; keep them apart.
            if edge.relationship_type == RelationshipType::Supersedes {
                inner.supersedes.push(stored);
            } else {
                inner.edges.push(stored);
            }
        }
        Ok(())
    }

    async fn search_memories(
        &self,
        query: &str,
        options: &StoreSearchOptions,
    ) -> Result<Vec<MemorySearchResult>> {
        let inner = self.read();
        let now = Utc::now();
        let query_terms = tokenize(query);
        let recency_only = query.trim().is_empty();

        let mut scored: Vec<(f64, &Memory)> = inner
            .memories
            .iter()
            .filter(|m| m.namespace == options.namespace)
            .filter(|m| options.min_importance.admits(m.importance))
            .filter(|m| category_matches(m, &options.categories))
            .filter_map(|m| {
                let score = if recency_only {
                    recency_score(now, m.created_at)
                } else {
                    let haystack = format!("{} {}", m.content, m.summary);
                    let lexical = lexical_overlap(&haystack, &query_terms);
                    if lexical <= 0.0 {
                        return None;
                    }
                    (lexical * 0.75 + recency_score(now, m.created_at) * 0.25).clamp(0.0, 1.0)
                };
                Some((score, m))
            })
            .collect();

        scored.sort_by(|(ls, lm), (rs, rm)| {
            rs.total_cmp(ls).then_with(|| rm.created_at.cmp(&lm.created_at))
        });

        Ok(scored
            .into_iter()
            .take(options.limit)
            .map(|(score, m)| MemorySearchResult {
                id: m.id.clone(),
                content: m.content.clone(),
                summary: m.summary.clone(),
                metadata: if options.include_metadata {
                    memory_metadata(m)
                } else {
                    serde_json::Value::Null
                },
                score,
                strategy: "store".to_string(),
                timestamp: m.created_at,
                relationship: None,
            })
            .collect())
    }

    async fn get_related_memories(
        &self,
        memory_id: &str,
        options: &RelatedMemoriesOptions,
    ) -> Result<Vec<RelatedMemory>> {
        let inner = self.read();
        let mut hits = Vec::new();

        for edge in inner.edge_tables() {
            if edge.namespace != options.namespace {
                continue;
            }
            let neighbor_id = match options.direction {
                EdgeDirection::Outbound if edge.source_id == memory_id => {
                    &edge.relationship.target_memory_id
                }
                EdgeDirection::Inbound if edge.relationship.target_memory_id == memory_id => {
                    &edge.source_id
                }
                _ => continue,
            };
            if !options.relationship_types.is_empty()
                && !options
                    .relationship_types
                    .contains(&edge.relationship.relationship_type)
            {
                continue;
            }
            if edge.relationship.strength < options.min_strength
                || edge.relationship.confidence < options.min_confidence
            {
                continue;
            }
            let Some(&idx) = inner.by_id.get(neighbor_id) else {
                continue;
            };
            hits.push(RelatedMemory {
                memory: inner.memories[idx].clone(),
                relationship: edge.relationship.clone(),
            });
            if hits.len() >= options.limit {
                break;
            }
        }

        Ok(hits)
    }

    async fn get_memory_by_id(&self, memory_id: &str) -> Result<Option<Memory>> {
        let inner = self.read();
        Ok(inner
            .by_id
            .get(memory_id)
            .map(|&idx| inner.memories[idx].clone()))
    }

    async fn consolidate_duplicates(
        &self,
        primary_id: &str,
        duplicate_ids: &[String],
        namespace: &str,
    ) -> Result<ConsolidationReport> {
        // One write guard for the whole pass: field merge, edge rewrite,
        // and duplicate removal are observed together or not at all.
        let mut inner = self.write();
        let mut report = ConsolidationReport::default();

        let Some(&primary_idx) = inner.by_id.get(primary_id) else {
            return Err(Error::Storage(format!(
                "consolidation primary '{primary_id}' not found"
            )));
        };
        if inner.memories[primary_idx].namespace != namespace {
            return Err(Error::Storage(format!(
                "consolidation primary '{primary_id}' is outside namespace '{namespace}'"
            )));
        }

        let mut removable: Vec<String> = Vec::new();
        for dup_id in duplicate_ids {
            if dup_id == primary_id {
                report
                    .errors
                    .push((dup_id.clone(), "duplicate equals primary".to_string()));
                continue;
            }
            let Some(&dup_idx) = inner.by_id.get(dup_id) else {
                report
                    .errors
                    .push((dup_id.clone(), "duplicate not found".to_string()));
                continue;
            };
            if inner.memories[dup_idx].namespace != namespace {
                report
                    .errors
                    .push((dup_id.clone(), "outside namespace".to_string()));
                continue;
            }

            let dup = inner.memories[dup_idx].clone();
            let primary = &mut inner.memories[primary_idx];
            for entity in dup.entities {
                if !primary.entities.contains(&entity) {
                    primary.entities.push(entity);
                }
            }
            for keyword in dup.keywords {
                if !primary.keywords.contains(&keyword) {
                    primary.keywords.push(keyword);
                }
            }
            primary.importance = primary.importance.max(dup.importance);
            primary.confidence_score = primary.confidence_score.max(dup.confidence_score);
            primary.last_activity = Utc::now();

            removable.push(dup_id.clone());
            report.consolidated += 1;
        }

        // Rewrite edges so every reference to a removed duplicate points at
        // the primary instead; drop the self-loops this can produce.
        let removed: HashSet<&String> = removable.iter().collect();
        for edge in inner.edges.iter_mut() {
            if removed.contains(&edge.source_id) {
                edge.source_id = primary_id.to_string();
            }
            if removed.contains(&edge.relationship.target_memory_id) {
                edge.relationship.target_memory_id = primary_id.to_string();
            }
        }
        inner
            .edges
            .retain(|e| e.source_id != e.relationship.target_memory_id);

        for edge in inner.supersedes.iter_mut() {
            if removed.contains(&edge.source_id) {
                edge.source_id = primary_id.to_string();
            }
            if removed.contains(&edge.relationship.target_memory_id) {
                edge.relationship.target_memory_id = primary_id.to_string();
            }
        }
        inner
            .supersedes
            .retain(|e| e.source_id != e.relationship.target_memory_id);

        inner
            .memories
            .retain(|m| !removed.contains(&m.id));
        inner.rebuild_index();

        debug!(
            primary = primary_id,
            consolidated = report.consolidated,
            errors = report.errors.len(),
            "duplicate consolidation finished"
        );
        Ok(report)
    }

    async fn list_superseded(&self, namespace: &str) -> Result<Vec<String>> {
        let inner = self.read();
        let mut ids: Vec<String> = inner
            .supersedes
            .iter()
            .filter(|e| e.namespace == namespace)
            .map(|e| e.relationship.target_memory_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn get_memory_stats(&self, namespace: &str) -> Result<MemoryStats> {
        let inner = self.read();
        let mut stats = MemoryStats::default();
        for memory in inner.memories.iter().filter(|m| m.namespace == namespace) {
            stats.total_memories += 1;
            *stats
                .by_category
                .entry(memory.category.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_importance
                .entry(memory.importance.as_str().to_string())
                .or_default() += 1;
            let retention = match memory.retention {
                RetentionType::ShortTerm => "short_term",
                RetentionType::LongTerm => "long_term",
                RetentionType::Conscious => "conscious",
            };
            *stats.by_retention.entry(retention.to_string()).or_default() += 1;
        }
        stats.total_chat_entries = inner
            .chat_history
            .iter()
            .filter(|e| e.namespace == namespace)
            .count();
        stats.total_relationships = inner
            .edge_tables()
            .filter(|e| e.namespace == namespace)
            .count();
        Ok(stats)
    }

    async fn list_unprocessed_chat_history(
        &self,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<ChatHistoryEntry>> {
        let inner = self.read();
        Ok(inner
            .chat_history
            .iter()
            .filter(|e| e.namespace == namespace && !inner.processed_chat_ids.contains(&e.id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_chat_history_processed(&self, ids: &[String]) -> Result<()> {
        let mut inner = self.write();
        for id in ids {
            inner.processed_chat_ids.insert(id.clone());
        }
        Ok(())
    }
}
