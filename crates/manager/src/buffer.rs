//! Streaming capture buffer: assembles partial chunks into a complete
//! recordable exchange under timeout and size bounds.
//!
//! The watchdog is re-armed on every chunk arrival, so a slow-but-alive
//! stream survives while a silent one trips the timeout regardless of how
//! much content is already buffered.  The size bound holds at all times:
//! a chunk that would push the buffer past it fails the capture before the
//! content is appended.

use std::time::{Duration, Instant};

use futures::StreamExt;
use memoria_config::BufferConfig;
use memoria_core::{Error, Result, StreamingFailure};
use memoria_provider::{ChatCompletionChunk, ChunkStream, Usage};
use tracing::{debug, warn};

/// `Idle → Receiving → (Completed | FailedSize | FailedTimeout |
/// FailedUpstream)`; `reset()` returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Idle,
    Receiving,
    Completed,
    FailedSize,
    FailedTimeout,
    FailedUpstream,
}

/// Metadata accumulated while buffering one stream.
#[derive(Debug, Clone, Default)]
pub struct StreamMetadata {
    /// First non-empty model name seen in the chunks.
    pub model: Option<String>,
    pub chunk_count: usize,
    /// Characters of concatenated delta content.
    pub content_length: usize,
    pub duration: Duration,
    pub finish_reason: Option<String>,
    /// Usage from the final chunk, when the provider sends one.
    pub usage: Option<Usage>,
}

/// A fully buffered stream, ready for the recorder.
#[derive(Debug, Clone)]
pub struct BufferedStream {
    pub chunks: Vec<ChatCompletionChunk>,
    pub complete_content: String,
    pub metadata: StreamMetadata,
}

pub struct StreamingCaptureBuffer {
    config: BufferConfig,
    state: BufferState,
    chunks: Vec<ChatCompletionChunk>,
    content: String,
    content_chars: usize,
    metadata: StreamMetadata,
    errors: Vec<String>,
    started_at: Option<Instant>,
}

impl StreamingCaptureBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            state: BufferState::Idle,
            chunks: Vec::new(),
            content: String::new(),
            content_chars: 0,
            metadata: StreamMetadata::default(),
            errors: Vec::new(),
            started_at: None,
        }
    }

    pub fn state(&self) -> BufferState {
        self.state
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// When the current (or last) capture started.
    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    /// A buffer is recordable once it has received at least one chunk with
    /// actual content.
    pub fn is_ready_for_recording(&self) -> bool {
        self.metadata.chunk_count > 0 && self.content_chars > 0
    }

    /// Clear all state; the buffer instance is reusable.
    pub fn reset(&mut self) {
        self.state = BufferState::Idle;
        self.chunks.clear();
        self.content.clear();
        self.content_chars = 0;
        self.metadata = StreamMetadata::default();
        self.errors.clear();
        self.started_at = None;
    }

    fn fail(&mut self, state: BufferState, error: Error) -> Error {
        self.state = state;
        self.errors.push(error.to_string());
        error
    }

    /// Drive `stream` to completion, producing the buffered record.
    ///
    /// The stream is consumed either way; after a failure the caller can
    /// inspect the partial buffer before `reset()`.
    pub async fn consume(&mut self, mut stream: ChunkStream) -> Result<BufferedStream> {
        self.reset();
        self.state = BufferState::Receiving;
        let started = Instant::now();
        self.started_at = Some(started);
        let watchdog = Duration::from_millis(self.config.buffer_timeout_ms);

        loop {
            // timeout() around next() re-arms the watchdog per arrival.
            let arrival = tokio::time::timeout(watchdog, stream.next()).await;
            self.metadata.duration = started.elapsed();

            let item = match arrival {
                Err(_) => {
                    warn!(
                        timeout_ms = self.config.buffer_timeout_ms,
                        chunks = self.metadata.chunk_count,
                        "stream stalled, watchdog elapsed"
                    );
                    return Err(self.fail(
                        BufferState::FailedTimeout,
                        Error::Timeout(self.config.buffer_timeout_ms),
                    ));
                }
                Ok(None) => break,
                Ok(Some(Err(upstream))) => {
                    return Err(self.fail(
                        BufferState::FailedUpstream,
                        Error::Streaming(StreamingFailure::UpstreamAborted(upstream.to_string())),
                    ));
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            let delta = item.delta_content();
            let delta_chars = delta.chars().count();
            if self.content_chars + delta_chars > self.config.max_buffer_size_chars {
                return Err(self.fail(
                    BufferState::FailedSize,
                    Error::Streaming(StreamingFailure::SizeExceeded {
                        limit: self.config.max_buffer_size_chars,
                        observed: self.content_chars + delta_chars,
                    }),
                ));
            }

            self.content.push_str(delta);
            self.content_chars += delta_chars;
            if self.metadata.model.is_none() && !item.model.is_empty() {
                self.metadata.model = Some(item.model.clone());
            }
            if let Some(reason) = item.finish_reason() {
                self.metadata.finish_reason = Some(reason.to_string());
            }
            if let Some(usage) = item.usage {
                self.metadata.usage = Some(usage);
            }
            self.metadata.chunk_count += 1;
            self.metadata.content_length = self.content_chars;
            self.chunks.push(item);
        }

        self.state = BufferState::Completed;
        self.metadata.duration = started.elapsed();
        debug!(
            chunks = self.metadata.chunk_count,
            chars = self.content_chars,
            "stream capture completed"
        );
        Ok(BufferedStream {
            chunks: self.chunks.clone(),
            complete_content: self.content.clone(),
            metadata: self.metadata.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use memoria_core::ProviderError;
    use memoria_provider::mock::{content_chunk, final_chunk, scripted_stream};
    use memoria_provider::ScriptedChunk;

    fn config(timeout_ms: u64, max_chars: usize) -> BufferConfig {
        BufferConfig {
            buffer_timeout_ms: timeout_ms,
            max_buffer_size_chars: max_chars,
        }
    }

    fn plain(parts: &[&str]) -> ChunkStream {
        let mut chunks: Vec<ScriptedChunk> = parts
            .iter()
            .map(|p| ScriptedChunk { delay: None, item: Ok(content_chunk("test-model", p)) })
            .collect();
        chunks.push(ScriptedChunk {
            delay: None,
            item: Ok(final_chunk("test-model", Some(Usage { prompt_tokens: 1, completion_tokens: 2, total_tokens: 3 }))),
        });
        scripted_stream(chunks)
    }

    #[tokio::test]
    async fn concatenates_deltas_in_order() -> Result<()> {
        let mut buffer = StreamingCaptureBuffer::new(config(1_000, 10_000));
        let buffered = buffer.consume(plain(&["hel", "lo ", "world"])).await?;

        assert_eq!(buffered.complete_content, "hello world");
        assert_eq!(buffered.metadata.content_length, 11);
        // Three content chunks plus the terminal chunk.
        assert_eq!(buffered.metadata.chunk_count, 4);
        assert_eq!(buffered.metadata.model.as_deref(), Some("test-model"));
        assert_eq!(buffered.metadata.finish_reason.as_deref(), Some("stop"));
        assert!(buffered.metadata.usage.is_some());
        assert_eq!(buffer.state(), BufferState::Completed);
        assert!(buffer.is_ready_for_recording());
        Ok(())
    }

    /// Size breach: "hello" + "world!" is 11 chars against a 10-char bound.
    #[tokio::test]
    async fn size_breach_fails_without_buffering_past_bound() {
        let mut buffer = StreamingCaptureBuffer::new(config(1_000, 10));
        let err = buffer.consume(plain(&["hello", "world!"])).await.unwrap_err();

        match err {
            Error::Streaming(StreamingFailure::SizeExceeded { limit, observed }) => {
                assert_eq!(limit, 10);
                assert_eq!(observed, 11);
            }
            other => panic!("expected size-exceeded, got {other}"),
        }
        assert_eq!(buffer.state(), BufferState::FailedSize);
        assert_eq!(buffer.errors().len(), 1);
    }

    /// Watchdog: one chunk arrives, then the stream stalls past the bound.
    #[tokio::test]
    async fn stalled_stream_trips_the_watchdog() {
        let chunks = vec![
            ScriptedChunk { delay: None, item: Ok(content_chunk("test-model", "hi")) },
            ScriptedChunk {
                delay: Some(Duration::from_millis(200)),
                item: Ok(content_chunk("test-model", "never seen")),
            },
        ];
        let mut buffer = StreamingCaptureBuffer::new(config(50, 10_000));
        let err = buffer.consume(scripted_stream(chunks)).await.unwrap_err();

        assert!(matches!(err, Error::Timeout(50)));
        assert_eq!(buffer.state(), BufferState::FailedTimeout);
    }

    /// Progress re-arms the watchdog: chunks slower than half the timeout
    /// but faster than the whole of it keep the capture alive.
    #[tokio::test]
    async fn progress_rearms_the_watchdog() -> Result<()> {
        let chunks: Vec<ScriptedChunk> = (0..4)
            .map(|i| ScriptedChunk {
                delay: Some(Duration::from_millis(30)),
                item: Ok(content_chunk("test-model", &format!("c{i} "))),
            })
            .collect();
        let mut buffer = StreamingCaptureBuffer::new(config(80, 10_000));
        let buffered = buffer.consume(scripted_stream(chunks)).await?;
        assert_eq!(buffered.metadata.chunk_count, 4);
        Ok(())
    }

    #[tokio::test]
    async fn upstream_error_marks_failed_upstream() {
        let chunks = vec![
            ScriptedChunk { delay: None, item: Ok(content_chunk("test-model", "partial")) },
            ScriptedChunk {
                delay: None,
                item: Err(ProviderError::Network("connection reset".to_string())),
            },
        ];
        let mut buffer = StreamingCaptureBuffer::new(config(1_000, 10_000));
        let err = buffer.consume(scripted_stream(chunks)).await.unwrap_err();

        assert!(matches!(err, Error::Streaming(StreamingFailure::UpstreamAborted(_))));
        assert_eq!(buffer.state(), BufferState::FailedUpstream);
        // Partial content is observable until reset.
        assert!(buffer.is_ready_for_recording());
    }

    #[tokio::test]
    async fn reset_returns_to_idle_and_buffer_is_reusable() -> Result<()> {
        let mut buffer = StreamingCaptureBuffer::new(config(1_000, 10));
        let _ = buffer.consume(plain(&["hello", "world!"])).await;
        assert_eq!(buffer.state(), BufferState::FailedSize);

        buffer.reset();
        assert_eq!(buffer.state(), BufferState::Idle);
        assert!(!buffer.is_ready_for_recording());
        assert!(buffer.errors().is_empty());

        let buffered = buffer.consume(plain(&["ok"])).await?;
        assert_eq!(buffered.complete_content, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn empty_stream_completes_but_is_not_recordable() -> Result<()> {
        let mut buffer = StreamingCaptureBuffer::new(config(1_000, 10_000));
        let buffered = buffer.consume(scripted_stream(vec![])).await?;
        assert_eq!(buffered.complete_content, "");
        assert!(!buffer.is_ready_for_recording());
        Ok(())
    }
}
