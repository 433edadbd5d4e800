//! Scripted provider used by tests and integration scenarios.
//!
//! Replies are queued ahead of time and consumed in order; streaming
//! replies can attach per-chunk delays so timeout behavior is exercisable
//! without a live endpoint.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use memoria_core::ProviderError;
use uuid::Uuid;

use crate::provider::{ChatCompletionPayload, ChunkStream, LlmProvider};
use crate::types::{
    ChatChoice, ChatCompletionChunk, ChatCompletionParams, ChatCompletionResponse, ChatMessage,
    ChunkChoice, ChunkDelta, EmbeddingObject, EmbeddingParams, EmbeddingResponse, Usage,
};

/// One scripted streaming element: an optional pre-delivery delay plus the
/// chunk (or error) to deliver.
pub struct ScriptedChunk {
    pub delay: Option<Duration>,
    pub item: Result<ChatCompletionChunk, ProviderError>,
}

pub enum ScriptedReply {
    Complete(ChatCompletionResponse),
    Stream(Vec<ScriptedChunk>),
    Fail(ProviderError),
}

#[derive(Default)]
pub struct MockProvider {
    chat_replies: Mutex<VecDeque<ScriptedReply>>,
    embedding_dimensions: usize,
}

/// Build a delta chunk carrying `content`.
pub fn content_chunk(model: &str, content: &str) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: format!("chunk-{}", Uuid::new_v4()),
        object: "chat.completion.chunk".to_string(),
        created: chrono_now(),
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta { role: None, content: Some(content.to_string()) },
            finish_reason: None,
        }],
        usage: None,
    }
}

/// Build the terminal chunk with a finish reason and optional usage.
pub fn final_chunk(model: &str, usage: Option<Usage>) -> ChatCompletionChunk {
    ChatCompletionChunk {
        id: format!("chunk-{}", Uuid::new_v4()),
        object: "chat.completion.chunk".to_string(),
        created: chrono_now(),
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta: ChunkDelta::default(),
            finish_reason: Some("stop".to_string()),
        }],
        usage,
    }
}

fn chrono_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Build a finished (non-streaming) response with `content`.
pub fn complete_response(model: &str, content: &str) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: format!("resp-{}", Uuid::new_v4()),
        object: "chat.completion".to_string(),
        created: chrono_now(),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::assistant(content),
            finish_reason: Some("stop".to_string()),
        }],
        usage: Some(Usage { prompt_tokens: 12, completion_tokens: 34, total_tokens: 46 }),
        system_fingerprint: Some("mock-fp".to_string()),
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self { chat_replies: Mutex::new(VecDeque::new()), embedding_dimensions: 8 }
    }

    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// Queue a finished response containing `content`.
    pub fn push_complete(&self, model: &str, content: &str) {
        self.chat_replies
            .lock()
            .expect("mock reply queue poisoned")
            .push_back(ScriptedReply::Complete(complete_response(model, content)));
    }

    /// Queue a streaming reply that delivers `parts` as delta chunks and a
    /// terminal chunk carrying usage.
    pub fn push_stream(&self, model: &str, parts: &[&str]) {
        let mut chunks: Vec<ScriptedChunk> = parts
            .iter()
            .map(|part| ScriptedChunk { delay: None, item: Ok(content_chunk(model, part)) })
            .collect();
        chunks.push(ScriptedChunk {
            delay: None,
            item: Ok(final_chunk(
                model,
                Some(Usage { prompt_tokens: 5, completion_tokens: 7, total_tokens: 12 }),
            )),
        });
        self.push_scripted_stream(chunks);
    }

    /// Queue a raw scripted stream (with delays or errors).
    pub fn push_scripted_stream(&self, chunks: Vec<ScriptedChunk>) {
        self.chat_replies
            .lock()
            .expect("mock reply queue poisoned")
            .push_back(ScriptedReply::Stream(chunks));
    }

    pub fn push_failure(&self, error: ProviderError) {
        self.chat_replies
            .lock()
            .expect("mock reply queue poisoned")
            .push_back(ScriptedReply::Fail(error));
    }
}

/// Turn scripted chunks into a lazy stream, honoring per-chunk delays.
pub fn scripted_stream(chunks: Vec<ScriptedChunk>) -> ChunkStream {
    futures::stream::iter(chunks)
        .then(|scripted| async move {
            if let Some(delay) = scripted.delay {
                tokio::time::sleep(delay).await;
            }
            scripted.item
        })
        .boxed()
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn create_chat_completion(
        &self,
        params: &ChatCompletionParams,
    ) -> Result<ChatCompletionPayload, ProviderError> {
        let reply = self
            .chat_replies
            .lock()
            .expect("mock reply queue poisoned")
            .pop_front()
            .ok_or_else(|| {
                ProviderError::InvalidRequest("mock provider reply queue is empty".to_string())
            })?;
        match reply {
            ScriptedReply::Complete(mut response) => {
                response.model = params.model.clone();
                Ok(ChatCompletionPayload::Complete(response))
            }
            ScriptedReply::Stream(chunks) => {
                Ok(ChatCompletionPayload::Stream(scripted_stream(chunks)))
            }
            ScriptedReply::Fail(error) => Err(error),
        }
    }

    async fn create_embedding(
        &self,
        params: &EmbeddingParams,
    ) -> Result<EmbeddingResponse, ProviderError> {
        if params.input.is_empty() {
            return Err(ProviderError::InvalidRequest("empty embedding input".to_string()));
        }
        let data = (0..params.input.len())
            .map(|index| EmbeddingObject {
                index: index as u32,
                object: "embedding".to_string(),
                embedding: vec![0.0; self.embedding_dimensions],
            })
            .collect();
        Ok(EmbeddingResponse {
            object: "list".to_string(),
            model: params.model.clone(),
            data,
            usage: Some(Usage { prompt_tokens: 3, completion_tokens: 0, total_tokens: 3 }),
        })
    }
}
