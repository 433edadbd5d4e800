//! Conversation recorder: persists a completed exchange and its classified
//! derivative memory.
//!
//! Degradation rules: a classifier failure keeps the raw chat history and
//! skips only the derivative memory; a relationship write failure keeps the
//! memory and drops only the edges.  An empty AI output persists nothing.

use std::sync::Arc;

use chrono::Utc;
use memoria_config::{ProcessingMode, RecordingConfig};
use memoria_core::{ChatHistoryEntry, Error, ImportanceLevel, Result, RetentionType};
use memoria_store::MemoryStore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::buffer::BufferedStream;
use crate::classify::{ClassifyRequest, ConversationClassifier};

/// A finished (non-streaming) exchange ready for persistence.
#[derive(Debug, Clone)]
pub struct CompletedExchange {
    /// Caller-supplied id; generated when absent.  Chat-history writes are
    /// idempotent on this id.
    pub chat_id: Option<String>,
    pub user_input: String,
    pub ai_output: String,
    pub model: String,
    pub session_id: String,
    pub metadata: serde_json::Value,
}

/// Conversation context accompanying a buffered stream.
#[derive(Debug, Clone)]
pub struct StreamingContext {
    /// Stable id for replay idempotency; generated when absent.
    pub chat_id: Option<String>,
    pub session_id: String,
    pub user_input: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RecordedConversation {
    pub chat_id: String,
    /// Present iff the classifier succeeded and the processing mode keeps
    /// derivative memories.
    pub memory_id: Option<String>,
    pub relationships_stored: usize,
}

pub struct ConversationRecorder {
    store: Arc<dyn MemoryStore>,
    classifier: Arc<dyn ConversationClassifier>,
    config: RecordingConfig,
    namespace: String,
}

impl ConversationRecorder {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        classifier: Arc<dyn ConversationClassifier>,
        config: RecordingConfig,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            classifier,
            config,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Non-streaming path.
    pub async fn record_completed(
        &self,
        exchange: CompletedExchange,
    ) -> Result<RecordedConversation> {
        let chat_id = exchange
            .chat_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.record_inner(
            chat_id,
            exchange.user_input,
            exchange.ai_output,
            exchange.model,
            exchange.session_id,
            exchange.metadata,
        )
        .await
    }

    /// Streaming path: the buffered complete content plus the original user
    /// input.  When no user input was supplied, a diagnostic fallback
    /// string is recorded so audits can tell it apart from real input.
    pub async fn record_streaming(
        &self,
        buffered: &BufferedStream,
        context: StreamingContext,
    ) -> Result<RecordedConversation> {
        if buffered.complete_content.trim().is_empty() {
            return Err(Error::Recording(
                "streamed response produced no content".to_string(),
            ));
        }

        let StreamingContext { chat_id, session_id, user_input, mut metadata } = context;
        let chat_id = chat_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let model = buffered
            .metadata
            .model
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let user_input = match user_input {
            Some(text) => text,
            None => {
                warn!(session_id, "no user input for streamed exchange, recording fallback");
                format!(
                    "[stream capture fallback] user input unavailable (session {session_id}, model {model})"
                )
            }
        };

        if let Some(object) = metadata.as_object_mut() {
            object.insert("chunk_count".to_string(), buffered.metadata.chunk_count.into());
            object.insert(
                "stream_duration_ms".to_string(),
                (buffered.metadata.duration.as_millis() as u64).into(),
            );
            if let Some(reason) = &buffered.metadata.finish_reason {
                object.insert("finish_reason".to_string(), reason.clone().into());
            }
            if let Some(usage) = &buffered.metadata.usage {
                object.insert("usage".to_string(), serde_json::json!(usage));
            }
        }

        self.record_inner(
            chat_id,
            user_input,
            buffered.complete_content.clone(),
            model,
            session_id,
            metadata,
        )
        .await
    }

    async fn record_inner(
        &self,
        chat_id: String,
        user_input: String,
        ai_output: String,
        model: String,
        session_id: String,
        metadata: serde_json::Value,
    ) -> Result<RecordedConversation> {
        if ai_output.trim().is_empty() {
            return Err(Error::Recording("AI output is empty".to_string()));
        }

        let entry = ChatHistoryEntry {
            id: chat_id.clone(),
            user_input: user_input.clone(),
            ai_output: ai_output.clone(),
            model,
            session_id,
            namespace: self.namespace.clone(),
            metadata,
            created_at: Utc::now(),
        };
        self.store.store_chat_history(entry).await?;
        debug!(chat_id, "chat history persisted");

        match self.config.memory_processing_mode {
            ProcessingMode::None => {
                return Ok(RecordedConversation { chat_id, memory_id: None, relationships_stored: 0 });
            }
            ProcessingMode::Conscious => {
                // Raw history only; the background pass classifies later.
                debug!(chat_id, "classification deferred to conscious pass");
                return Ok(RecordedConversation { chat_id, memory_id: None, relationships_stored: 0 });
            }
            ProcessingMode::Auto => {}
        }

        let request = ClassifyRequest {
            chat_id: chat_id.clone(),
            user_input,
            ai_output,
            context: None,
        };
        let processed = match self.classifier.process_conversation(&request).await {
            Ok(processed) => processed,
            Err(err) => {
                // The raw exchange is already safe; only the derivative is lost.
                warn!(chat_id, error = %err, "classifier failed, keeping raw history only");
                return Ok(RecordedConversation { chat_id, memory_id: None, relationships_stored: 0 });
            }
        };

        if !self.config.min_importance_level.admits(processed.importance) {
            debug!(
                chat_id,
                importance = processed.importance.as_str(),
                "memory below importance threshold, skipped"
            );
            self.mark_processed(&chat_id).await;
            return Ok(RecordedConversation { chat_id, memory_id: None, relationships_stored: 0 });
        }

        let retention = if processed.importance >= ImportanceLevel::High {
            RetentionType::LongTerm
        } else {
            RetentionType::ShortTerm
        };
        let memory_id = self
            .store
            .store_processed_memory(&processed, &chat_id, &self.namespace, retention)
            .await?;

        let mut relationships_stored = 0;
        if self.config.enable_relationship_extraction && !processed.related_memories.is_empty() {
            match self
                .store
                .store_memory_relationships(&memory_id, &processed.related_memories, &self.namespace)
                .await
            {
                Ok(()) => relationships_stored = processed.related_memories.len(),
                Err(err) => {
                    // The memory survives without its edges.
                    warn!(memory_id, error = %err, "relationship persistence failed");
                }
            }
        }

        self.mark_processed(&chat_id).await;
        Ok(RecordedConversation {
            chat_id,
            memory_id: Some(memory_id),
            relationships_stored,
        })
    }

    async fn mark_processed(&self, chat_id: &str) {
        let ids = [chat_id.to_string()];
        if let Err(err) = self.store.mark_chat_history_processed(&ids).await {
            warn!(chat_id, error = %err, "could not mark chat history processed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use memoria_core::{
        MemoryCategory, MemoryClassification, MemoryRelationship, MinImportance, ProcessedMemory,
        RelationshipType,
    };
    use memoria_store::{InMemoryStore, StoreSearchOptions};

    use crate::buffer::StreamMetadata;
    use crate::classify::KeywordClassifier;

    fn recorder_config() -> RecordingConfig {
        RecordingConfig::default()
    }

    fn exchange(user: &str, ai: &str) -> CompletedExchange {
        CompletedExchange {
            chat_id: Some("chat-1".to_string()),
            user_input: user.to_string(),
            ai_output: ai.to_string(),
            model: "test-model".to_string(),
            session_id: "session-1".to_string(),
            metadata: serde_json::json!({}),
        }
    }

    fn recorder_with(
        store: Arc<InMemoryStore>,
        classifier: Arc<dyn ConversationClassifier>,
        config: RecordingConfig,
    ) -> ConversationRecorder {
        ConversationRecorder::new(store, classifier, config, "default")
    }

    struct FailingClassifier;

    #[async_trait]
    impl ConversationClassifier for FailingClassifier {
        async fn process_conversation(&self, _request: &ClassifyRequest) -> Result<ProcessedMemory, Error> {
            Err(Error::Storage("classifier backend offline".to_string()))
        }
    }

    struct RelationshipClassifier;

    #[async_trait]
    impl ConversationClassifier for RelationshipClassifier {
        async fn process_conversation(&self, request: &ClassifyRequest) -> Result<ProcessedMemory, Error> {
            Ok(ProcessedMemory {
                content: request.ai_output.clone(),
                summary: "summary".to_string(),
                classification: MemoryClassification::Factual,
                category: MemoryCategory::Technical,
                importance: ImportanceLevel::High,
                entities: vec![],
                keywords: vec![],
                confidence_score: 0.9,
                classification_reason: "fixture".to_string(),
                related_memories: vec![MemoryRelationship::new(
                    "other-memory",
                    RelationshipType::Related,
                    0.9,
                    0.8,
                    "fixture edge for recorder tests",
                )
                .unwrap()],
            })
        }
    }

    #[tokio::test]
    async fn records_history_and_derivative_memory() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let recorder = recorder_with(
            Arc::clone(&store),
            Arc::new(KeywordClassifier::new()),
            recorder_config(),
        );

        let recorded = recorder
            .record_completed(exchange("I prefer tabs over spaces", "Noted, tabs it is."))
            .await?;
        assert!(recorded.memory_id.is_some());

        let stats = store.get_memory_stats("default").await?;
        assert_eq!(stats.total_chat_entries, 1);
        assert_eq!(stats.total_memories, 1);
        Ok(())
    }

    #[tokio::test]
    async fn empty_output_persists_nothing() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let recorder = recorder_with(
            Arc::clone(&store),
            Arc::new(KeywordClassifier::new()),
            recorder_config(),
        );

        let err = recorder
            .record_completed(exchange("hello", "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Recording(_)));

        let stats = store.get_memory_stats("default").await?;
        assert_eq!(stats.total_chat_entries, 0);
        assert_eq!(stats.total_memories, 0);
        Ok(())
    }

    #[tokio::test]
    async fn classifier_failure_keeps_raw_history() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let recorder =
            recorder_with(Arc::clone(&store), Arc::new(FailingClassifier), recorder_config());

        let recorded = recorder
            .record_completed(exchange("hello", "hi there"))
            .await?;
        assert!(recorded.memory_id.is_none());

        let stats = store.get_memory_stats("default").await?;
        assert_eq!(stats.total_chat_entries, 1);
        assert_eq!(stats.total_memories, 0);
        Ok(())
    }

    #[tokio::test]
    async fn relationship_extraction_respects_the_flag() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let mut config = recorder_config();
        config.enable_relationship_extraction = false;
        let recorder =
            recorder_with(Arc::clone(&store), Arc::new(RelationshipClassifier), config);

        let recorded = recorder
            .record_completed(exchange("link these", "linked"))
            .await?;
        assert_eq!(recorded.relationships_stored, 0);
        let stats = store.get_memory_stats("default").await?;
        assert_eq!(stats.total_relationships, 0);

        let recorder = recorder_with(
            Arc::clone(&store),
            Arc::new(RelationshipClassifier),
            recorder_config(),
        );
        let recorded = recorder
            .record_completed(CompletedExchange {
                chat_id: Some("chat-2".to_string()),
                ..exchange("link these", "linked")
            })
            .await?;
        assert_eq!(recorded.relationships_stored, 1);
        let stats = store.get_memory_stats("default").await?;
        assert_eq!(stats.total_relationships, 1);
        Ok(())
    }

    #[tokio::test]
    async fn importance_threshold_skips_derivative() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let mut config = recorder_config();
        config.min_importance_level = MinImportance::Critical;
        let recorder =
            recorder_with(Arc::clone(&store), Arc::new(KeywordClassifier::new()), config);

        let recorded = recorder
            .record_completed(exchange("small talk", "indeed"))
            .await?;
        assert!(recorded.memory_id.is_none());
        let stats = store.get_memory_stats("default").await?;
        assert_eq!(stats.total_chat_entries, 1);
        assert_eq!(stats.total_memories, 0);
        Ok(())
    }

    #[tokio::test]
    async fn conscious_mode_defers_classification() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let mut config = recorder_config();
        config.memory_processing_mode = ProcessingMode::Conscious;
        let recorder =
            recorder_with(Arc::clone(&store), Arc::new(KeywordClassifier::new()), config);

        recorder.record_completed(exchange("hello", "hi")).await?;
        let stats = store.get_memory_stats("default").await?;
        assert_eq!(stats.total_memories, 0);
        let pending = store.list_unprocessed_chat_history("default", 10).await?;
        assert_eq!(pending.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn streaming_fallback_input_names_session_and_model() -> Result<()> {
        let store = Arc::new(InMemoryStore::new());
        let recorder = recorder_with(
            Arc::clone(&store),
            Arc::new(KeywordClassifier::new()),
            recorder_config(),
        );

        let buffered = BufferedStream {
            chunks: vec![],
            complete_content: "streamed answer".to_string(),
            metadata: StreamMetadata {
                model: Some("stream-model".to_string()),
                chunk_count: 3,
                content_length: 15,
                ..Default::default()
            },
        };
        recorder
            .record_streaming(
                &buffered,
                StreamingContext {
                    chat_id: None,
                    session_id: "session-9".to_string(),
                    user_input: None,
                    metadata: serde_json::json!({}),
                },
            )
            .await?;

        let pending = store.list_unprocessed_chat_history("default", 10).await?;
        // Auto mode marks it processed; fetch through search instead.
        assert!(pending.is_empty());
        let results = store
            .search_memories("", &StoreSearchOptions::new("default", 10))
            .await?;
        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("session-9"));
        assert!(results[0].content.contains("stream-model"));
        Ok(())
    }

    #[tokio::test]
    async fn streaming_empty_content_is_a_recording_error() {
        let store = Arc::new(InMemoryStore::new());
        let recorder = recorder_with(
            Arc::clone(&store),
            Arc::new(KeywordClassifier::new()),
            recorder_config(),
        );

        let buffered = BufferedStream {
            chunks: vec![],
            complete_content: String::new(),
            metadata: StreamMetadata::default(),
        };
        let err = recorder
            .record_streaming(
                &buffered,
                StreamingContext {
                    chat_id: None,
                    session_id: "session-9".to_string(),
                    user_input: Some("hello".to_string()),
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Recording(_)));
    }
}
