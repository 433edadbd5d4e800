//! Top-level coordinator: records chat and embedding calls through the
//! capture pipeline and fronts the search orchestrator.

use std::sync::Arc;

use memoria_config::{MemoriaConfig, ProcessingMode};
use memoria_core::{
    Error, ImportanceLevel, MemoryCategory, MemoryClassification, MemorySearchResult, MemoryStats,
    ProcessedMemory, Result, RetentionType, SearchQuery,
};
use memoria_provider::{
    ChatCompletionParams, ChatCompletionPayload, ChatCompletionResponse, EmbeddingParams,
    EmbeddingResponse,
};
use memoria_search::SearchOrchestrator;
use memoria_store::{ConsolidationReport, MemoryStore};
use tokio::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::buffer::{BufferedStream, StreamingCaptureBuffer};
use crate::classify::ConversationClassifier;
use crate::conscious::{spawn_conscious_worker, ConsciousWorkerHandle};
use crate::recorder::{
    CompletedExchange, ConversationRecorder, RecordedConversation, StreamingContext,
};
use crate::retry::{OperationContext, OperationPayload, RetryContextHolder};

/// Per-call recording options.
#[derive(Debug, Clone)]
pub struct RecordingOptions {
    /// `false` short-circuits recording for this call only.
    pub enable_memory: bool,
    pub session_id: Option<String>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        Self { enable_memory: true, session_id: None }
    }
}

/// What a record call did.
#[derive(Debug, Clone)]
pub enum RecordOutcome {
    Recorded(RecordedConversation),
    /// Recording disabled by configuration or per-call options.
    Skipped,
}

impl RecordOutcome {
    pub fn recorded(&self) -> Option<&RecordedConversation> {
        match self {
            Self::Recorded(conversation) => Some(conversation),
            Self::Skipped => None,
        }
    }
}

pub struct MemoryManager {
    store: Arc<dyn MemoryStore>,
    classifier: Arc<dyn ConversationClassifier>,
    recorder: ConversationRecorder,
    orchestrator: SearchOrchestrator,
    retry_holder: RetryContextHolder,
    config: MemoriaConfig,
}

impl MemoryManager {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        classifier: Arc<dyn ConversationClassifier>,
        config: MemoriaConfig,
    ) -> Result<Self> {
        config.validate()?;
        let recorder = ConversationRecorder::new(
            Arc::clone(&store),
            Arc::clone(&classifier),
            config.recording.clone(),
            config.namespace.default.clone(),
        );
        let orchestrator = SearchOrchestrator::new(Arc::clone(&store), &config);
        Ok(Self {
            store,
            classifier,
            recorder,
            orchestrator,
            retry_holder: RetryContextHolder::new(),
            config,
        })
    }

    pub fn config(&self) -> &MemoriaConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    pub fn retry_context(&self) -> &RetryContextHolder {
        &self.retry_holder
    }

    /// Spawn the deferred-classification pass.  Returns `None` unless the
    /// configured processing mode is `Conscious`.
    pub fn start_conscious_worker(&self) -> Option<ConsciousWorkerHandle> {
        if self.config.recording.memory_processing_mode != ProcessingMode::Conscious {
            return None;
        }
        Some(spawn_conscious_worker(
            Arc::clone(&self.store),
            Arc::clone(&self.classifier),
            self.config.namespace.default.clone(),
            self.config.recording.background_update_interval_ms,
            50,
        ))
    }

    // ── Recording ──────────────────────────────────────────────────────────

    /// Record one chat completion call.  Streaming responses are detected
    /// by payload variant and drained through the capture buffer.
    pub async fn record_chat_completion(
        &self,
        params: &ChatCompletionParams,
        payload: ChatCompletionPayload,
        options: &RecordingOptions,
    ) -> Result<RecordOutcome> {
        if !options.enable_memory || !self.config.recording.enable_chat_memory {
            debug!("chat memory disabled, skipping record");
            return Ok(RecordOutcome::Skipped);
        }
        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match payload {
            ChatCompletionPayload::Stream(stream) => {
                // Buffers are instance-local: one per concurrent stream.
                let mut buffer = StreamingCaptureBuffer::new(self.config.buffer.clone());
                let buffered = buffer.consume(stream).await?;
                let chat_id = Uuid::new_v4().to_string();
                match self
                    .recorder
                    .record_streaming(&buffered, self.streaming_context(&chat_id, &session_id, params))
                    .await
                {
                    Ok(recorded) => Ok(RecordOutcome::Recorded(recorded)),
                    Err(err) => {
                        self.recover_recording(
                            OperationPayload::BufferedChat { params: params.clone(), buffered },
                            options,
                            chat_id,
                            session_id,
                            err,
                        )
                        .await
                    }
                }
            }
            ChatCompletionPayload::Complete(response) => {
                let chat_id = Uuid::new_v4().to_string();
                match self
                    .recorder
                    .record_completed(self.completed_exchange(&chat_id, &session_id, params, &response))
                    .await
                {
                    Ok(recorded) => Ok(RecordOutcome::Recorded(recorded)),
                    Err(err) => {
                        self.recover_recording(
                            OperationPayload::Chat { params: params.clone(), response },
                            options,
                            chat_id,
                            session_id,
                            err,
                        )
                        .await
                    }
                }
            }
        }
    }

    /// Record one embedding call as a synthetic reference memory.
    pub async fn record_embedding(
        &self,
        params: &EmbeddingParams,
        response: &EmbeddingResponse,
        options: &RecordingOptions,
    ) -> Result<RecordOutcome> {
        if !options.enable_memory || !self.config.recording.enable_embedding_memory {
            debug!("embedding memory disabled, skipping record");
            return Ok(RecordOutcome::Skipped);
        }
        let session_id = options
            .session_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let chat_id = Uuid::new_v4().to_string();

        match self
            .store_embedding_record(&chat_id, &session_id, params, response)
            .await
        {
            Ok(recorded) => Ok(RecordOutcome::Recorded(recorded)),
            Err(err) => {
                self.recover_recording(
                    OperationPayload::Embedding {
                        params: params.clone(),
                        response: response.clone(),
                    },
                    options,
                    chat_id,
                    session_id,
                    err,
                )
                .await
            }
        }
    }

    async fn store_embedding_record(
        &self,
        chat_id: &str,
        session_id: &str,
        params: &EmbeddingParams,
        response: &EmbeddingResponse,
    ) -> Result<RecordedConversation> {
        let user_input = format!("Embedding request: {}", params.input.summary(120));
        let ai_output = format!(
            "Generated {} embeddings of {} dimensions",
            response.data.len(),
            response.dimensions()
        );

        let entry = memoria_core::ChatHistoryEntry {
            id: chat_id.to_string(),
            user_input: user_input.clone(),
            ai_output: ai_output.clone(),
            model: params.model.clone(),
            session_id: session_id.to_string(),
            namespace: self.config.namespace.default.clone(),
            metadata: serde_json::json!({ "kind": "embedding" }),
            created_at: chrono::Utc::now(),
        };
        self.store.store_chat_history(entry).await?;

        if self.config.recording.memory_processing_mode == ProcessingMode::None {
            return Ok(RecordedConversation {
                chat_id: chat_id.to_string(),
                memory_id: None,
                relationships_stored: 0,
            });
        }

        // Embedding records are always plain references, never classified.
        let processed = ProcessedMemory {
            content: format!("{user_input}\n{ai_output}"),
            summary: user_input,
            classification: MemoryClassification::Reference,
            category: MemoryCategory::General,
            importance: ImportanceLevel::Low,
            entities: Vec::new(),
            keywords: Vec::new(),
            confidence_score: 0.9,
            classification_reason: "embedding call record".to_string(),
            related_memories: Vec::new(),
        };
        let memory_id = self
            .store
            .store_processed_memory(
                &processed,
                chat_id,
                &self.config.namespace.default,
                RetentionType::ShortTerm,
            )
            .await?;
        let ids = [chat_id.to_string()];
        if let Err(err) = self.store.mark_chat_history_processed(&ids).await {
            warn!(chat_id, error = %err, "could not mark embedding record processed");
        }

        Ok(RecordedConversation {
            chat_id: chat_id.to_string(),
            memory_id: Some(memory_id),
            relationships_stored: 0,
        })
    }

    // ── Failure recovery ───────────────────────────────────────────────────

    /// Push an operation context and delegate to the retry policy.
    async fn recover_recording(
        &self,
        payload: OperationPayload,
        options: &RecordingOptions,
        chat_id: String,
        session_id: String,
        err: Error,
    ) -> Result<RecordOutcome> {
        let mut options = options.clone();
        options.session_id = Some(session_id);
        let mut context = OperationContext::new(payload, options);
        context.chat_id = chat_id;
        self.retry_holder.store(context);

        if !err.is_transient() {
            return Err(err);
        }
        warn!(error = %err, "recording failed, entering retry loop");
        self.retry_last_failed_operation().await
    }

    /// Replay the stored context with exponential backoff.  The context is
    /// cleared on success and re-stored after exhaustion.
    pub async fn retry_last_failed_operation(&self) -> Result<RecordOutcome> {
        let Some(context) = self.retry_holder.take() else {
            return Err(Error::Recording("no failed operation to retry".to_string()));
        };

        let retry = &self.config.retry;
        let mut last_error = Error::Recording("retry loop did not run".to_string());
        for attempt in 1..=retry.max_retries {
            let delay = retry
                .base_delay_ms
                .saturating_mul(1u64 << (attempt - 1).min(20))
                .min(retry.max_delay_ms);
            tokio::time::sleep(Duration::from_millis(delay)).await;

            match self.replay(&context).await {
                Ok(recorded) => {
                    info!(attempt, "recording retry succeeded");
                    return Ok(RecordOutcome::Recorded(recorded));
                }
                Err(err) => {
                    debug!(attempt, error = %err, "recording retry failed");
                    last_error = err;
                }
            }
        }

        // Exhausted: keep the context as the last failed operation.
        self.retry_holder.store(context);
        Err(last_error)
    }

    async fn replay(&self, context: &OperationContext) -> Result<RecordedConversation> {
        let session_id = context
            .options
            .session_id
            .clone()
            .unwrap_or_else(|| "unknown-session".to_string());
        match &context.payload {
            OperationPayload::Chat { params, response } => {
                self.recorder
                    .record_completed(self.completed_exchange(
                        &context.chat_id,
                        &session_id,
                        params,
                        response,
                    ))
                    .await
            }
            OperationPayload::BufferedChat { params, buffered } => {
                self.recorder
                    .record_streaming(
                        buffered,
                        self.streaming_context(&context.chat_id, &session_id, params),
                    )
                    .await
            }
            OperationPayload::Embedding { params, response } => {
                self.store_embedding_record(&context.chat_id, &session_id, params, response)
                    .await
            }
        }
    }

    fn completed_exchange(
        &self,
        chat_id: &str,
        session_id: &str,
        params: &ChatCompletionParams,
        response: &ChatCompletionResponse,
    ) -> CompletedExchange {
        let mut metadata = serde_json::Map::new();
        if let Some(reason) = response.finish_reason() {
            metadata.insert("finish_reason".to_string(), reason.into());
        }
        if let Some(fingerprint) = &response.system_fingerprint {
            metadata.insert("system_fingerprint".to_string(), fingerprint.clone().into());
        }
        if let Some(usage) = &response.usage {
            metadata.insert("usage".to_string(), serde_json::json!(usage));
        }
        CompletedExchange {
            chat_id: Some(chat_id.to_string()),
            user_input: params.last_user_message().unwrap_or("").to_string(),
            ai_output: response.primary_content().to_string(),
            model: response.model.clone(),
            session_id: session_id.to_string(),
            metadata: serde_json::Value::Object(metadata),
        }
    }

    fn streaming_context(
        &self,
        chat_id: &str,
        session_id: &str,
        params: &ChatCompletionParams,
    ) -> StreamingContext {
        StreamingContext {
            chat_id: Some(chat_id.to_string()),
            session_id: session_id.to_string(),
            user_input: params.last_user_message().map(str::to_string),
            metadata: serde_json::json!({ "requested_model": params.model }),
        }
    }

    // ── Query surface ──────────────────────────────────────────────────────

    pub async fn search_memories(&self, mut query: SearchQuery) -> Result<Vec<MemorySearchResult>> {
        if query.namespace.is_empty() {
            query.namespace = self.config.namespace.default.clone();
        }
        self.orchestrator.search(query).await
    }

    pub async fn search_with_strategy(
        &self,
        strategy: &str,
        mut query: SearchQuery,
    ) -> Result<Vec<MemorySearchResult>> {
        if query.namespace.is_empty() {
            query.namespace = self.config.namespace.default.clone();
        }
        self.orchestrator.search_with_strategy(strategy, query).await
    }

    /// Aggregate counts for `namespace`, defaulting to the configured one.
    pub async fn get_memory_stats(&self, namespace: Option<&str>) -> Result<MemoryStats> {
        let namespace = namespace.unwrap_or(&self.config.namespace.default);
        self.store.get_memory_stats(namespace).await
    }

    /// Merge duplicate memories into `primary_id`.  The store performs all
    /// three writes atomically and reports per-id failures.
    pub async fn consolidate_duplicates(
        &self,
        primary_id: &str,
        duplicate_ids: &[String],
        namespace: Option<&str>,
    ) -> Result<ConsolidationReport> {
        let namespace = namespace.unwrap_or(&self.config.namespace.default);
        self.store
            .consolidate_duplicates(primary_id, duplicate_ids, namespace)
            .await
    }
}
