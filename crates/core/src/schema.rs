use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Primary topical bucket a memory is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Personal,
    Work,
    Technical,
    Preference,
    Task,
    General,
}

impl MemoryCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Work => "work",
            Self::Technical => "technical",
            Self::Preference => "preference",
            Self::Task => "task",
            Self::General => "general",
        }
    }
}

/// Importance rungs, ordered so `Critical > High > Medium > Low` holds for
/// threshold comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ImportanceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Importance threshold used by configuration: either a concrete rung or
/// `All` (no filtering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinImportance {
    All,
    Low,
    Medium,
    High,
    Critical,
}

impl MinImportance {
    /// Whether a memory at `level` clears this threshold.
    pub fn admits(&self, level: ImportanceLevel) -> bool {
        match self {
            Self::All => true,
            Self::Low => level >= ImportanceLevel::Low,
            Self::Medium => level >= ImportanceLevel::Medium,
            Self::High => level >= ImportanceLevel::High,
            Self::Critical => level >= ImportanceLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryClassification {
    Conversational,
    Reference,
    Task,
    Preference,
    Factual,
}

/// How long a memory is intended to live.  `Conscious` entries are produced
/// by the deferred background pass rather than inline classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionType {
    ShortTerm,
    LongTerm,
    Conscious,
}

/// Durable, classified unit of knowledge derived from a conversation.
///
/// Created by the conversation recorder after classification; mutated only
/// by consolidation.  Belongs to exactly one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub summary: String,
    pub category: MemoryCategory,
    pub importance: ImportanceLevel,
    pub classification: MemoryClassification,
    pub entities: Vec<String>,
    pub keywords: Vec<String>,
    pub confidence_score: f64,
    pub retention: RetentionType,
    /// Opaque classifier output carried alongside the structured fields.
    #[serde(default)]
    pub processed_data: BTreeMap<String, serde_json::Value>,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Memory {
    /// Fresh id for a newly recorded memory.
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Raw exchange persisted before (and independently of) classification.
/// Immutable once written; writes are idempotent on `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryEntry {
    pub id: String,
    pub user_input: String,
    pub ai_output: String,
    pub model: String,
    pub session_id: String,
    pub namespace: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Continuation,
    Reference,
    Related,
    Supersedes,
    Contradiction,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continuation => "continuation",
            Self::Reference => "reference",
            Self::Related => "related",
            Self::Supersedes => "supersedes",
            Self::Contradiction => "contradiction",
        }
    }
}

/// Minimum length accepted for a relationship's human-readable reason.
pub const MIN_RELATIONSHIP_REASON_LEN: usize = 10;

/// Directed, typed, weighted edge between two memories in one namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRelationship {
    pub target_memory_id: String,
    pub relationship_type: RelationshipType,
    pub confidence: f64,
    pub strength: f64,
    pub reason: String,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub context: String,
}

impl MemoryRelationship {
    /// Build an edge, enforcing the weight ranges and the reason-length
    /// invariant.
    pub fn new(
        target_memory_id: impl Into<String>,
        relationship_type: RelationshipType,
        confidence: f64,
        strength: f64,
        reason: impl Into<String>,
    ) -> Result<Self> {
        let reason: String = reason.into();
        if reason.trim().len() < MIN_RELATIONSHIP_REASON_LEN {
            return Err(Error::Validation(format!(
                "relationship reason must be at least {MIN_RELATIONSHIP_REASON_LEN} characters"
            )));
        }
        if !(0.0..=1.0).contains(&confidence) || !(0.0..=1.0).contains(&strength) {
            return Err(Error::Validation(
                "relationship confidence and strength must be within [0, 1]".to_string(),
            ));
        }
        Ok(Self {
            target_memory_id: target_memory_id.into(),
            relationship_type,
            confidence,
            strength,
            reason,
            entities: Vec::new(),
            context: String::new(),
        })
    }

    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// Classifier agent output for one recorded exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMemory {
    pub content: String,
    pub summary: String,
    pub classification: MemoryClassification,
    pub category: MemoryCategory,
    pub importance: ImportanceLevel,
    pub entities: Vec<String>,
    pub keywords: Vec<String>,
    pub confidence_score: f64,
    pub classification_reason: String,
    #[serde(default)]
    pub related_memories: Vec<MemoryRelationship>,
}

/// Extra context attached to results produced by the relationship strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipContext {
    /// Traversal path from the origin, inclusive of the result node.
    /// Present only when the query asked for paths.
    pub path: Option<Vec<String>>,
    /// Hop count from the origin memory.
    pub distance: usize,
    /// Product of edge strengths along the path.
    pub connection_strength: f64,
    pub related_entities: Vec<String>,
}

/// A single ranked hit emitted by a search strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySearchResult {
    pub id: String,
    pub content: String,
    pub summary: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Normalized relevance in [0, 1].
    pub score: f64,
    /// Name of the strategy that produced this hit.
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipContext>,
}

/// Aggregate memory counts for one namespace.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memories: usize,
    pub total_chat_entries: usize,
    pub total_relationships: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_importance: BTreeMap<String, usize>,
    pub by_retention: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn importance_ordering_supports_threshold_comparison() {
        assert!(ImportanceLevel::Critical > ImportanceLevel::High);
        assert!(ImportanceLevel::High > ImportanceLevel::Medium);
        assert!(ImportanceLevel::Medium > ImportanceLevel::Low);
    }

    #[test]
    fn min_importance_all_admits_everything() {
        for level in [
            ImportanceLevel::Low,
            ImportanceLevel::Medium,
            ImportanceLevel::High,
            ImportanceLevel::Critical,
        ] {
            assert!(MinImportance::All.admits(level));
        }
        assert!(!MinImportance::High.admits(ImportanceLevel::Medium));
        assert!(MinImportance::High.admits(ImportanceLevel::Critical));
    }

    #[test]
    fn relationship_rejects_short_reason() {
        let result = MemoryRelationship::new(
            "mem-1",
            RelationshipType::Related,
            0.9,
            0.8,
            "too short",
        );
        assert!(result.is_err());
    }

    #[test]
    fn relationship_rejects_out_of_range_weights() {
        let result = MemoryRelationship::new(
            "mem-1",
            RelationshipType::Reference,
            1.2,
            0.8,
            "confidence exceeds the unit interval",
        );
        assert!(result.is_err());
    }

    #[test]
    fn relationship_accepts_valid_edge() {
        let edge = MemoryRelationship::new(
            "mem-1",
            RelationshipType::Supersedes,
            0.9,
            0.7,
            "newer decision replaces the earlier one",
        )
        .unwrap();
        assert_eq!(edge.relationship_type, RelationshipType::Supersedes);
    }
}
