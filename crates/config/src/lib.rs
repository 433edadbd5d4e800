use std::env;
use std::fs;
use std::path::Path;

use memoria_core::{Error, MinImportance, Result};
use serde::{Deserialize, Serialize};

/// Deferred-classification mode.  `Auto` classifies inline during recording,
/// `Conscious` leaves raw history for the background pass, `None` records
/// history only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    Auto,
    Conscious,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub enable_chat_memory: bool,
    pub enable_embedding_memory: bool,
    pub memory_processing_mode: ProcessingMode,
    pub min_importance_level: MinImportance,
    pub enable_relationship_extraction: bool,
    /// Period of the conscious-mode background pass.
    pub background_update_interval_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            enable_chat_memory: true,
            enable_embedding_memory: false,
            memory_processing_mode: ProcessingMode::Auto,
            min_importance_level: MinImportance::All,
            enable_relationship_extraction: true,
            background_update_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Watchdog timeout for the streaming capture buffer.  Re-armed on
    /// every chunk arrival.
    pub buffer_timeout_ms: u64,
    /// Maximum characters of concatenated content the buffer will hold.
    pub max_buffer_size_chars: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_timeout_ms: 30_000,
            max_buffer_size_chars: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Soft deadline applied to each strategy invocation.
    pub strategy_timeout_ms: u64,
    /// LIKE strategy case sensitivity.
    pub like_case_sensitive: bool,
    /// Category hierarchy depth ceiling for the category filter.
    pub max_category_depth: usize,
    /// Nested-path depth ceiling for the metadata filter.
    pub max_metadata_depth: usize,
    /// Confidence floor for accepting a natural-language temporal parse.
    pub temporal_confidence_threshold: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy_timeout_ms: 5_000,
            like_case_sensitive: false,
            max_category_depth: 5,
            max_metadata_depth: 10,
            temporal_confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Ceiling on the per-query `max_depth`.
    pub max_traversal_depth: usize,
    /// Depth used when a relationship query does not specify one.
    pub default_traversal_depth: usize,
    /// Per-node fan-out cap on adjacency fetches.
    pub max_relationships_per_node: usize,
    /// Weights for the strength-weighted ordering and traversal scoring.
    /// Must sum to 1.
    pub strength_weight: f64,
    pub confidence_weight: f64,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: 10,
            default_traversal_depth: 2,
            max_relationships_per_node: 25,
            strength_weight: 0.6,
            confidence_weight: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    /// Hard ceiling on a single backoff wait.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures inside the window that trip the circuit.
    pub failure_threshold: u32,
    /// Window within which consecutive failures are counted.
    pub failure_window_ms: u64,
    /// Cooldown before an open circuit admits a half-open probe.
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            failure_window_ms: 60_000,
            cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MemoriaConfig {
    /// Logical tenant scope applied to every record and query.
    pub namespace: NamespaceConfig,
    pub recording: RecordingConfig,
    pub buffer: BufferConfig,
    pub search: SearchConfig,
    pub traversal: TraversalConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    pub default: String,
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            default: "default".to_string(),
        }
    }
}

impl MemoriaConfig {
    /// Load from a TOML file, falling back to defaults when the file is
    /// absent.  `MEMORIA_NAMESPACE` overrides the configured namespace.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = fs::read_to_string(path) {
            config = toml::from_str(&raw)
                .map_err(|err| Error::Configuration(format!("invalid config file: {err}")))?;
        }

        if let Ok(value) = env::var("MEMORIA_NAMESPACE") {
            if !value.is_empty() {
                config.namespace.default = value;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(self)
            .map_err(|err| Error::Configuration(format!("cannot render config: {err}")))?;
        fs::write(path, rendered)?;
        Ok(())
    }

    /// Cross-field consistency checks.  Run at load time and again by
    /// consumers that accept a config directly.
    pub fn validate(&self) -> Result<()> {
        if self.traversal.default_traversal_depth > self.traversal.max_traversal_depth {
            return Err(Error::Configuration(format!(
                "default traversal depth {} exceeds maximum {}",
                self.traversal.default_traversal_depth, self.traversal.max_traversal_depth
            )));
        }
        let weight_sum = self.traversal.strength_weight + self.traversal.confidence_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(Error::Configuration(format!(
                "strength and confidence weights must sum to 1 (got {weight_sum})"
            )));
        }
        if self.buffer.max_buffer_size_chars == 0 {
            return Err(Error::Configuration(
                "max buffer size must be nonzero".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(Error::Configuration(
                "circuit breaker failure threshold must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
