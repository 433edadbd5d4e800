//! Minimal end-to-end tour: a scripted provider behind the facade, two
//! recorded exchanges, then a search over the captured memories.
//!
//! Run with: `cargo run -p memoria-facade --example quickstart`

use std::sync::Arc;

use futures::StreamExt;
use memoria_config::MemoriaConfig;
use memoria_core::SearchQuery;
use memoria_facade::Memoria;
use memoria_manager::{KeywordClassifier, MemoryManager};
use memoria_provider::{
    ChatCompletionParams, ChatCompletionPayload, ChatMessage, MockProvider,
};
use memoria_store::{InMemoryStore, MemoryStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let provider = MockProvider::new();
    provider.push_complete(
        "demo-model",
        "tokio's scheduler steals work across threads to keep cores busy",
    );
    provider.push_stream("demo-model", &["prefer ", "bounded ", "channels ", "for backpressure"]);

    let store: Arc<dyn MemoryStore> = Arc::new(InMemoryStore::new());
    let manager = MemoryManager::new(
        Arc::clone(&store),
        Arc::new(KeywordClassifier::new()),
        MemoriaConfig::default(),
    )?;
    let client = Memoria::new(Arc::new(provider), Arc::new(manager));

    // A completed exchange, recorded transparently.
    let payload = client
        .chat()
        .create(ChatCompletionParams::new(
            "demo-model",
            vec![ChatMessage::user("how does tokio keep all cores busy")],
        ))
        .await?;
    if let ChatCompletionPayload::Complete(response) = payload {
        println!("assistant: {}", response.primary_content());
    }

    // A streamed exchange: the caller drains chunks while capture runs on
    // the teed side.
    let payload = client
        .chat()
        .create(ChatCompletionParams::new(
            "demo-model",
            vec![ChatMessage::user("channel advice for async pipelines")],
        ))
        .await?;
    if let ChatCompletionPayload::Stream(mut stream) = payload {
        print!("assistant (streamed): ");
        while let Some(chunk) = stream.next().await {
            print!("{}", chunk?.delta_content());
        }
        println!();
    }

    // Background capture of the stream finishes momentarily.
    for _ in 0..50 {
        if client.memory().stats(None).await?.total_chat_entries >= 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let stats = client.memory().stats(None).await?;
    println!(
        "captured: {} exchanges, {} memories",
        stats.total_chat_entries, stats.total_memories
    );

    let hits = client
        .memory()
        .search(SearchQuery::new("tokio scheduler cores", "default").with_limit(3))
        .await?;
    for hit in hits {
        println!("[{:.2}] {} — {}", hit.score, hit.strategy, hit.summary);
    }
    Ok(())
}
