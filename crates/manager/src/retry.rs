//! Retry envelope for failed recordings.
//!
//! A single cell, last-writer-wins: a newer failure overwrites any stored
//! context, because the older one's server-side state may have moved on
//! and replaying it is not safe.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use memoria_provider::{
    ChatCompletionParams, ChatCompletionResponse, EmbeddingParams, EmbeddingResponse,
};
use tracing::debug;

use crate::buffer::BufferedStream;
use crate::manager::RecordingOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Chat,
    Embedding,
}

/// The replayable form of a failed recording.  Streams are captured as
/// their buffered result — the live iterator is one-shot and gone.
#[derive(Debug, Clone)]
pub enum OperationPayload {
    Chat {
        params: ChatCompletionParams,
        response: ChatCompletionResponse,
    },
    BufferedChat {
        params: ChatCompletionParams,
        buffered: BufferedStream,
    },
    Embedding {
        params: EmbeddingParams,
        response: EmbeddingResponse,
    },
}

impl OperationPayload {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Chat { .. } | Self::BufferedChat { .. } => OperationKind::Chat,
            Self::Embedding { .. } => OperationKind::Embedding,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OperationContext {
    pub payload: OperationPayload,
    pub options: RecordingOptions,
    /// Chat-history id chosen on the first attempt; replays reuse it so
    /// the idempotent history write cannot duplicate rows.
    pub chat_id: String,
    pub captured_at: DateTime<Utc>,
}

impl OperationContext {
    pub fn new(payload: OperationPayload, options: RecordingOptions) -> Self {
        Self {
            payload,
            options,
            chat_id: String::new(),
            captured_at: Utc::now(),
        }
    }
}

/// At most one in-flight "last failed recording" context.
#[derive(Default)]
pub struct RetryContextHolder {
    cell: Mutex<Option<OperationContext>>,
}

impl RetryContextHolder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<OperationContext>> {
        self.cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a context, discarding any previous one.
    pub fn store(&self, context: OperationContext) {
        let mut cell = self.lock();
        if let Some(previous) = cell.as_ref() {
            debug!(
                captured_at = %previous.captured_at,
                "discarding stale retry context"
            );
        }
        *cell = Some(context);
    }

    /// Remove and return the stored context.
    pub fn take(&self) -> Option<OperationContext> {
        self.lock().take()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.lock().as_ref().map(|c| c.captured_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memoria_provider::mock::complete_response;
    use memoria_provider::ChatMessage;

    fn chat_context(marker: &str) -> OperationContext {
        OperationContext::new(
            OperationPayload::Chat {
                params: ChatCompletionParams::new(
                    "test-model",
                    vec![ChatMessage::user(marker)],
                ),
                response: complete_response("test-model", "answer"),
            },
            RecordingOptions::default(),
        )
    }

    #[test]
    fn starts_empty() {
        let holder = RetryContextHolder::new();
        assert!(holder.is_empty());
        assert!(holder.take().is_none());
    }

    #[test]
    fn later_failure_overwrites_earlier_context() {
        let holder = RetryContextHolder::new();
        holder.store(chat_context("first"));
        holder.store(chat_context("second"));

        let context = holder.take().expect("context stored");
        let OperationPayload::Chat { params, .. } = &context.payload else {
            panic!("expected chat payload");
        };
        assert_eq!(params.last_user_message(), Some("second"));
        assert!(holder.is_empty(), "take removes the context");
    }

    #[test]
    fn clear_discards_the_cell() {
        let holder = RetryContextHolder::new();
        holder.store(chat_context("x"));
        holder.clear();
        assert!(holder.is_empty());
    }

    #[test]
    fn payload_kind_mapping() {
        let chat = chat_context("x");
        assert_eq!(chat.payload.kind(), OperationKind::Chat);
    }
}
