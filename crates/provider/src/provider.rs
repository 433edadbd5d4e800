use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use memoria_core::ProviderError;

use crate::types::{
    ChatCompletionChunk, ChatCompletionParams, ChatCompletionResponse, EmbeddingParams,
    EmbeddingResponse,
};

/// Lazy, one-shot sequence of chat chunks.  Chunks arrive in order; the
/// final chunk carries a finish reason.
pub type ChunkStream =
    Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, ProviderError>> + Send>>;

/// What a chat completion call produced: a finished response, or a stream
/// the caller must drain.
pub enum ChatCompletionPayload {
    Complete(ChatCompletionResponse),
    Stream(ChunkStream),
}

impl ChatCompletionPayload {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

impl std::fmt::Debug for ChatCompletionPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(response) => f.debug_tuple("Complete").field(response).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The external LLM provider surface this system consumes.  Transport is
/// out of scope; implementations normalize their failures into
/// [`ProviderError`].
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn create_chat_completion(
        &self,
        params: &ChatCompletionParams,
    ) -> Result<ChatCompletionPayload, ProviderError>;

    async fn create_embedding(
        &self,
        params: &EmbeddingParams,
    ) -> Result<EmbeddingResponse, ProviderError>;
}
