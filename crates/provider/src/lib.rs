pub mod mock;
pub mod provider;
pub mod types;

pub use mock::{MockProvider, ScriptedChunk, ScriptedReply};
pub use provider::{ChatCompletionPayload, ChunkStream, LlmProvider};
pub use types::{
    ChatChoice, ChatCompletionChunk, ChatCompletionParams, ChatCompletionResponse, ChatMessage,
    ChatRole, ChunkChoice, ChunkDelta, EmbeddingInput, EmbeddingObject, EmbeddingParams,
    EmbeddingResponse, Usage,
};
