//! Abstract persistence seam consumed by the search and capture pipelines.
//!
//! The persistence layout is opaque to the rest of the system; only the
//! operations below are normative.  Implementations must make
//! [`MemoryStore::consolidate_duplicates`] atomic across its three writes
//! and keep writes issued by one recorder invocation visible in program
//! order.

use async_trait::async_trait;
use memoria_core::{
    ChatHistoryEntry, Memory, MemoryRelationship, MemorySearchResult, MemoryStats, MinImportance,
    ProcessedMemory, RelationshipType, Result, RetentionType,
};

/// Options for [`MemoryStore::search_memories`].
#[derive(Debug, Clone)]
pub struct StoreSearchOptions {
    pub namespace: String,
    pub limit: usize,
    pub min_importance: MinImportance,
    /// Empty means no category constraint.
    pub categories: Vec<String>,
    pub include_metadata: bool,
}

impl StoreSearchOptions {
    pub fn new(namespace: impl Into<String>, limit: usize) -> Self {
        Self {
            namespace: namespace.into(),
            limit,
            min_importance: MinImportance::All,
            categories: Vec::new(),
            include_metadata: true,
        }
    }
}

/// Which side of an edge the queried memory sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    /// Edges whose source is the queried memory.
    Outbound,
    /// Edges whose target is the queried memory.
    Inbound,
}

/// Options for [`MemoryStore::get_related_memories`].
#[derive(Debug, Clone)]
pub struct RelatedMemoriesOptions {
    pub namespace: String,
    /// Empty means all edge types.
    pub relationship_types: Vec<RelationshipType>,
    pub min_confidence: f64,
    pub min_strength: f64,
    pub direction: EdgeDirection,
    /// Fan-out cap for this adjacency fetch.
    pub limit: usize,
}

impl RelatedMemoriesOptions {
    pub fn outbound(namespace: impl Into<String>, limit: usize) -> Self {
        Self {
            namespace: namespace.into(),
            relationship_types: Vec::new(),
            min_confidence: 0.0,
            min_strength: 0.0,
            direction: EdgeDirection::Outbound,
            limit,
        }
    }
}

/// One adjacency hit: the neighbor memory together with the edge that
/// connects it to the queried memory.
#[derive(Debug, Clone)]
pub struct RelatedMemory {
    pub memory: Memory,
    pub relationship: MemoryRelationship,
}

/// Outcome of a consolidation pass; partial failure reports per-id errors.
#[derive(Debug, Clone, Default)]
pub struct ConsolidationReport {
    pub consolidated: usize,
    pub errors: Vec<(String, String)>,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist a raw exchange.  Idempotent on the entry id.
    async fn store_chat_history(&self, entry: ChatHistoryEntry) -> Result<()>;

    /// Persist a classified memory derived from `chat_id`; returns the new
    /// memory id.  `retention` is decided by the recorder (inline
    /// classification yields short/long term, the deferred pass yields
    /// conscious entries).
    async fn store_processed_memory(
        &self,
        processed: &ProcessedMemory,
        chat_id: &str,
        namespace: &str,
        retention: RetentionType,
    ) -> Result<String>;

    /// Persist outbound edges for `source_memory_id`.  The caller provides
    /// general and `supersedes` edges in one list; the store partitions.
    async fn store_memory_relationships(
        &self,
        source_memory_id: &str,
        edges: &[MemoryRelationship],
        namespace: &str,
    ) -> Result<()>;

    /// Text search over stored memories.  An empty query returns the most
    /// recent memories ordered by recency.
    async fn search_memories(
        &self,
        query: &str,
        options: &StoreSearchOptions,
    ) -> Result<Vec<MemorySearchResult>>;

    /// Adjacency fetch for one memory, honoring the type/weight filters and
    /// the fan-out cap.
    async fn get_related_memories(
        &self,
        memory_id: &str,
        options: &RelatedMemoriesOptions,
    ) -> Result<Vec<RelatedMemory>>;

    async fn get_memory_by_id(&self, memory_id: &str) -> Result<Option<Memory>>;

    /// Merge `duplicate_ids` into `primary_id` atomically: field merge,
    /// edge rewrite, duplicate removal.
    async fn consolidate_duplicates(
        &self,
        primary_id: &str,
        duplicate_ids: &[String],
        namespace: &str,
    ) -> Result<ConsolidationReport>;

    /// Ids of memories deprecated by a `supersedes` edge.  Exposes the
    /// deprecation policy without enforcing it on reads.
    async fn list_superseded(&self, namespace: &str) -> Result<Vec<String>>;

    async fn get_memory_stats(&self, namespace: &str) -> Result<MemoryStats>;

    /// Chat history rows not yet consumed by the conscious-mode pass.
    async fn list_unprocessed_chat_history(
        &self,
        namespace: &str,
        limit: usize,
    ) -> Result<Vec<ChatHistoryEntry>>;

    async fn mark_chat_history_processed(&self, ids: &[String]) -> Result<()>;
}
