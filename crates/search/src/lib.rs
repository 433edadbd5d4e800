pub mod error_handler;
pub mod orchestrator;
pub mod stats;
pub mod strategies;
pub mod strategy;
pub mod validation;

pub use error_handler::{CircuitReport, CircuitState, ErrorNotification, StrategyErrorHandler};
pub use orchestrator::SearchOrchestrator;
pub use stats::{SearchStatistics, StrategyStats};
pub use strategies::{
    CategoryFilterStrategy, EmbedFn, FtsSearchStrategy, LikeSearchStrategy,
    MetadataFilterStrategy, RecentSearchStrategy, RelationshipSearchStrategy,
    SemanticSearchStrategy, TemporalFilterStrategy,
};
pub use strategy::{default_priority, names, SearchStrategy, StrategyCapability};
pub use validation::sanitize_query;
