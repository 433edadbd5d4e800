pub mod in_memory;
pub mod store;

pub use in_memory::InMemoryStore;
pub use store::{
    ConsolidationReport, EdgeDirection, MemoryStore, RelatedMemoriesOptions, RelatedMemory,
    StoreSearchOptions,
};
