//! Drop-in facade over an OpenAI-compatible provider.
//!
//! Call shapes mirror the provider SDK (`chat().create(...)`,
//! `embeddings().create(...)`); every call is forwarded unchanged and the
//! memory manager records it on the side.  Memory capture is transparent:
//! a capture failure is logged, never surfaced to the caller, and the
//! provider's response always comes back intact.

use std::sync::Arc;

use futures::StreamExt;
use memoria_core::{MemorySearchResult, MemoryStats, ProviderError, Result, SearchQuery};
use memoria_manager::{MemoryManager, RecordingOptions};
use memoria_provider::{
    ChatCompletionChunk, ChatCompletionParams, ChatCompletionPayload, ChunkStream,
    EmbeddingParams, EmbeddingResponse, LlmProvider,
};
use tokio::sync::mpsc;
use tracing::warn;

pub struct Memoria {
    provider: Arc<dyn LlmProvider>,
    manager: Arc<MemoryManager>,
}

impl Memoria {
    pub fn new(provider: Arc<dyn LlmProvider>, manager: Arc<MemoryManager>) -> Self {
        Self { provider, manager }
    }

    pub fn chat(&self) -> Chat<'_> {
        Chat { facade: self }
    }

    pub fn embeddings(&self) -> Embeddings<'_> {
        Embeddings { facade: self }
    }

    pub fn memory(&self) -> MemoryApi<'_> {
        MemoryApi { facade: self }
    }

    pub fn manager(&self) -> &Arc<MemoryManager> {
        &self.manager
    }

    /// Split an upstream chunk stream: the caller consumes one side while a
    /// background task drives the capture buffer on the other.  The
    /// watchdog sees real arrival times because chunks are forwarded as
    /// they land.
    fn tee_and_record(
        &self,
        params: ChatCompletionParams,
        mut upstream: ChunkStream,
        options: RecordingOptions,
    ) -> ChunkStream {
        let (caller_tx, caller_rx) = mpsc::channel::<StreamItem>(64);
        let (record_tx, record_rx) = mpsc::channel::<StreamItem>(64);

        tokio::spawn(async move {
            while let Some(item) = upstream.next().await {
                let _ = record_tx.send(item.clone()).await;
                // A dropped caller must not stop the capture side.
                let _ = caller_tx.send(item).await;
            }
        });

        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move {
            let record_stream = receiver_stream(record_rx);
            if let Err(err) = manager
                .record_chat_completion(&params, ChatCompletionPayload::Stream(record_stream), &options)
                .await
            {
                warn!(error = %err, "streaming memory capture failed");
            }
        });

        receiver_stream(caller_rx)
    }
}

type StreamItem = std::result::Result<ChatCompletionChunk, ProviderError>;

fn receiver_stream(receiver: mpsc::Receiver<StreamItem>) -> ChunkStream {
    futures::stream::unfold(receiver, |mut receiver| async move {
        receiver.recv().await.map(|item| (item, receiver))
    })
    .boxed()
}

pub struct Chat<'a> {
    facade: &'a Memoria,
}

impl Chat<'_> {
    pub async fn create(&self, params: ChatCompletionParams) -> Result<ChatCompletionPayload> {
        self.create_with_options(params, RecordingOptions::default()).await
    }

    pub async fn create_with_options(
        &self,
        params: ChatCompletionParams,
        options: RecordingOptions,
    ) -> Result<ChatCompletionPayload> {
        let payload = self.facade.provider.create_chat_completion(&params).await?;

        let recording_enabled =
            options.enable_memory && self.facade.manager.config().recording.enable_chat_memory;
        if !recording_enabled {
            return Ok(payload);
        }

        match payload {
            ChatCompletionPayload::Complete(response) => {
                if let Err(err) = self
                    .facade
                    .manager
                    .record_chat_completion(
                        &params,
                        ChatCompletionPayload::Complete(response.clone()),
                        &options,
                    )
                    .await
                {
                    warn!(error = %err, "memory capture failed for chat completion");
                }
                Ok(ChatCompletionPayload::Complete(response))
            }
            ChatCompletionPayload::Stream(upstream) => Ok(ChatCompletionPayload::Stream(
                self.facade.tee_and_record(params, upstream, options),
            )),
        }
    }
}

pub struct Embeddings<'a> {
    facade: &'a Memoria,
}

impl Embeddings<'_> {
    pub async fn create(&self, params: EmbeddingParams) -> Result<EmbeddingResponse> {
        self.create_with_options(params, RecordingOptions::default()).await
    }

    pub async fn create_with_options(
        &self,
        params: EmbeddingParams,
        options: RecordingOptions,
    ) -> Result<EmbeddingResponse> {
        let response = self.facade.provider.create_embedding(&params).await?;
        if let Err(err) = self
            .facade
            .manager
            .record_embedding(&params, &response, &options)
            .await
        {
            warn!(error = %err, "memory capture failed for embedding call");
        }
        Ok(response)
    }
}

pub struct MemoryApi<'a> {
    facade: &'a Memoria,
}

impl MemoryApi<'_> {
    pub async fn search(&self, query: SearchQuery) -> Result<Vec<MemorySearchResult>> {
        self.facade.manager.search_memories(query).await
    }

    pub async fn search_with_strategy(
        &self,
        strategy: &str,
        query: SearchQuery,
    ) -> Result<Vec<MemorySearchResult>> {
        self.facade.manager.search_with_strategy(strategy, query).await
    }

    pub async fn stats(&self, namespace: Option<&str>) -> Result<MemoryStats> {
        self.facade.manager.get_memory_stats(namespace).await
    }
}
