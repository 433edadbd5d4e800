//! Classifier agent interface plus a deterministic keyword-driven default.
//!
//! The real classification agent is an external collaborator; the
//! `KeywordClassifier` keeps the pipeline runnable without one and serves
//! as the test double's reference behavior.

use async_trait::async_trait;
use memoria_core::{
    ImportanceLevel, MemoryCategory, MemoryClassification, ProcessedMemory, Result,
};
use regex::Regex;

/// One exchange handed to the classifier.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    pub chat_id: String,
    pub user_input: String,
    pub ai_output: String,
    pub context: Option<String>,
}

#[async_trait]
pub trait ConversationClassifier: Send + Sync {
    async fn process_conversation(&self, request: &ClassifyRequest) -> Result<ProcessedMemory>;
}

/// Common English stop words excluded from the keyword set.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "was", "has", "are", "not", "this", "that", "with", "from", "have",
    "you", "can", "its", "will", "but", "they", "all", "been", "also", "into", "more", "than",
    "when", "who", "what", "how", "out", "our", "new", "now",
];

const TECHNICAL_MARKERS: &[&str] = &[
    "code", "rust", "async", "api", "database", "server", "deploy", "bug", "error", "compile",
    "function", "crate", "runtime",
];
const WORK_MARKERS: &[&str] =
    &["meeting", "deadline", "project", "sprint", "standup", "review", "ticket", "release"];
const PREFERENCE_MARKERS: &[&str] =
    &["prefer", "like", "love", "hate", "favorite", "rather", "always use", "never use"];
const TASK_MARKERS: &[&str] =
    &["todo", "remind", "task", "schedule", "follow up", "by tomorrow", "next week"];
const IMPORTANCE_MARKERS: &[&str] =
    &["critical", "important", "urgent", "remember", "always", "never forget"];

pub struct KeywordClassifier {
    entity_pattern: Regex,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self {
            // Capitalized word runs ("Rust Belt"), plus emails and URLs.
            entity_pattern: Regex::new(
                r"\b[A-Z][a-zA-Z0-9]+(?:\s+[A-Z][a-zA-Z0-9]+)*\b|\bhttps?://\S+|\b[\w.+-]+@[\w-]+\.[\w.]+\b",
            )
            .expect("static regex"),
        }
    }

    fn keywords(text: &str) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut keywords: Vec<String> = Vec::new();
        for token in text
            .split(|ch: char| !ch.is_alphanumeric())
            .filter(|t| t.len() >= 4)
            .map(str::to_lowercase)
            .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        {
            if seen.insert(token.clone()) {
                keywords.push(token);
            }
            if keywords.len() >= 12 {
                break;
            }
        }
        keywords
    }

    fn entities(&self, text: &str) -> Vec<String> {
        let mut entities: Vec<String> = Vec::new();
        for m in self.entity_pattern.find_iter(text) {
            let entity = m.as_str().trim().to_string();
            // Single sentence-initial words are too noisy to keep.
            if entity.chars().count() < 3 {
                continue;
            }
            if !entities.contains(&entity) {
                entities.push(entity);
            }
            if entities.len() >= 10 {
                break;
            }
        }
        entities
    }

    fn contains_any(haystack: &str, markers: &[&str]) -> bool {
        markers.iter().any(|m| haystack.contains(m))
    }

    fn summarize(text: &str) -> String {
        let first_sentence = text
            .split_terminator(['.', '!', '?', '\n'])
            .map(str::trim)
            .find(|s| !s.is_empty())
            .unwrap_or(text);
        first_sentence.chars().take(160).collect()
    }
}

#[async_trait]
impl ConversationClassifier for KeywordClassifier {
    async fn process_conversation(&self, request: &ClassifyRequest) -> Result<ProcessedMemory> {
        let combined = format!("{} {}", request.user_input, request.ai_output);
        let lowered = combined.to_lowercase();

        let (classification, category) = if Self::contains_any(&lowered, PREFERENCE_MARKERS) {
            (MemoryClassification::Preference, MemoryCategory::Preference)
        } else if Self::contains_any(&lowered, TASK_MARKERS) {
            (MemoryClassification::Task, MemoryCategory::Task)
        } else if Self::contains_any(&lowered, TECHNICAL_MARKERS) {
            (MemoryClassification::Factual, MemoryCategory::Technical)
        } else if Self::contains_any(&lowered, WORK_MARKERS) {
            (MemoryClassification::Factual, MemoryCategory::Work)
        } else {
            (MemoryClassification::Conversational, MemoryCategory::General)
        };

        let importance = if Self::contains_any(&lowered, IMPORTANCE_MARKERS) {
            ImportanceLevel::High
        } else if classification == MemoryClassification::Preference
            || classification == MemoryClassification::Task
        {
            ImportanceLevel::Medium
        } else {
            ImportanceLevel::Low
        };

        let keywords = Self::keywords(&lowered);
        // Confidence grows with lexical evidence, bounded well below 1.
        let confidence = (0.5 + keywords.len() as f64 * 0.03).min(0.9);

        Ok(ProcessedMemory {
            content: combined.trim().to_string(),
            summary: Self::summarize(&request.user_input),
            classification,
            category,
            importance,
            entities: self.entities(&combined),
            keywords,
            confidence_score: confidence,
            classification_reason: format!(
                "keyword heuristic: {} markers matched",
                category.as_str()
            ),
            related_memories: Vec::new(),
        })
    }
}
