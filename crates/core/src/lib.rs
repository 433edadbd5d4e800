pub mod error;
pub mod filter;
pub mod query;
pub mod schema;

pub use error::{Error, ProviderError, Result, StreamingFailure};
pub use filter::{FilterExpression, FilterOp};
pub use query::{
    RelationshipParams, SearchQuery, SortDirection, TemporalBounds, TraversalStrategy,
    MAX_CATEGORY_LEN, MAX_METADATA_FILTER_BYTES, MAX_QUERY_TEXT_LEN, MAX_RESULT_LIMIT,
    MAX_RESULT_OFFSET,
};
pub use schema::{
    ChatHistoryEntry, ImportanceLevel, Memory, MemoryCategory, MemoryClassification,
    MemoryRelationship, MemorySearchResult, MemoryStats, MinImportance, ProcessedMemory,
    RelationshipContext, RelationshipType, RetentionType,
};
