//! Facade scenarios: forwarding, transparent capture, and the memory
//! query surface.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use memoria_config::MemoriaConfig;
use memoria_facade::Memoria;
use memoria_manager::{KeywordClassifier, MemoryManager};
use memoria_provider::{
    ChatCompletionParams, ChatCompletionPayload, ChatMessage, EmbeddingInput, EmbeddingParams,
    MockProvider,
};
use memoria_search::names;
use memoria_store::{InMemoryStore, MemoryStore};
use memoria_core::SearchQuery;

fn config() -> MemoriaConfig {
    let mut config = MemoriaConfig::default();
    config.recording.enable_embedding_memory = true;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 10;
    config
}

fn facade_over(provider: MockProvider, config: MemoriaConfig) -> (Memoria, Arc<dyn MemoryStore>) {
    let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    let manager = MemoryManager::new(
        Arc::clone(&store),
        Arc::new(KeywordClassifier::new()),
        config,
    )
    .expect("valid config");
    (Memoria::new(Arc::new(provider), Arc::new(manager)), store)
}

fn params(user_text: &str) -> ChatCompletionParams {
    ChatCompletionParams::new("test-model", vec![ChatMessage::user(user_text)])
}

/// Wait until the background capture lands, bounded by a deadline.
async fn wait_for_chat_entries(facade: &Memoria, expected: usize) -> Result<()> {
    for _ in 0..100 {
        let stats = facade.memory().stats(None).await?;
        if stats.total_chat_entries >= expected {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("capture did not finish in time");
}

#[tokio::test]
async fn complete_chat_is_forwarded_and_recorded() -> Result<()> {
    let provider = MockProvider::new();
    provider.push_complete("test-model", "use a work-stealing scheduler");
    let (facade, _store) = facade_over(provider, config());

    let payload = facade
        .chat()
        .create(params("how should I schedule async tasks"))
        .await?;
    let ChatCompletionPayload::Complete(response) = payload else {
        panic!("expected a complete payload");
    };
    assert_eq!(response.primary_content(), "use a work-stealing scheduler");

    let stats = facade.memory().stats(None).await?;
    assert_eq!(stats.total_chat_entries, 1);
    assert_eq!(stats.total_memories, 1);
    Ok(())
}

#[tokio::test]
async fn streaming_chat_reaches_caller_and_memory() -> Result<()> {
    let provider = MockProvider::new();
    provider.push_stream("test-model", &["hel", "lo ", "world"]);
    let (facade, _store) = facade_over(provider, config());

    let payload = facade.chat().create(params("say hello")).await?;
    let ChatCompletionPayload::Stream(mut stream) = payload else {
        panic!("expected a stream payload");
    };

    let mut collected = String::new();
    while let Some(chunk) = stream.next().await {
        collected.push_str(chunk?.delta_content());
    }
    assert_eq!(collected, "hello world");

    // The capture side runs in the background; give it a bounded moment.
    wait_for_chat_entries(&facade, 1).await?;
    let results = facade
        .memory()
        .search(SearchQuery::new("", "default").with_limit(5))
        .await?;
    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("say hello"));
    assert!(results[0].content.contains("hello world"));
    Ok(())
}

#[tokio::test]
async fn disabled_chat_memory_still_forwards() -> Result<()> {
    let provider = MockProvider::new();
    provider.push_complete("test-model", "unrecorded reply");
    let mut config = config();
    config.recording.enable_chat_memory = false;
    let (facade, _store) = facade_over(provider, config);

    let payload = facade.chat().create(params("hello")).await?;
    assert!(matches!(payload, ChatCompletionPayload::Complete(_)));

    let stats = facade.memory().stats(None).await?;
    assert_eq!(stats.total_chat_entries, 0);
    Ok(())
}

#[tokio::test]
async fn embeddings_are_forwarded_and_recorded() -> Result<()> {
    let provider = MockProvider::new().with_embedding_dimensions(8);
    let (facade, _store) = facade_over(provider, config());

    let response = facade
        .embeddings()
        .create(EmbeddingParams {
            model: "embed-model".to_string(),
            input: EmbeddingInput::Single("remember this phrase".to_string()),
        })
        .await?;
    assert_eq!(response.dimensions(), 8);

    let stats = facade.memory().stats(None).await?;
    assert_eq!(stats.total_chat_entries, 1);
    assert_eq!(stats.by_importance.get("low"), Some(&1));
    Ok(())
}

#[tokio::test]
async fn memory_search_round_trip() -> Result<()> {
    let provider = MockProvider::new();
    provider.push_complete(
        "test-model",
        "rustls is a safer default than openssl for new services",
    );
    let (facade, _store) = facade_over(provider, config());
    facade.chat().create(params("which tls library should we use")).await?;

    let results = facade
        .memory()
        .search(SearchQuery::new("rustls openssl services", "default"))
        .await?;
    assert!(!results.is_empty());
    assert!(results[0].content.contains("rustls"));

    let strict = facade
        .memory()
        .search_with_strategy(names::LIKE, SearchQuery::new("rustls", "default"))
        .await?;
    assert!(!strict.is_empty());
    Ok(())
}

#[tokio::test]
async fn provider_errors_pass_through_unwrapped() {
    let provider = MockProvider::new();
    provider.push_failure(memoria_core::ProviderError::RateLimit("slow down".to_string()));
    let (facade, _store) = facade_over(provider, config());

    let err = facade.chat().create(params("hello")).await.unwrap_err();
    assert!(matches!(
        err,
        memoria_core::Error::Provider(memoria_core::ProviderError::RateLimit(_))
    ));
}
