//! Conscious-mode background pass: drains unclassified chat history on an
//! interval and produces deferred derivative memories.

use std::sync::Arc;
use std::time::Duration;

use memoria_core::{Result, RetentionType};
use memoria_store::MemoryStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::classify::{ClassifyRequest, ConversationClassifier};

/// Handle to a running conscious worker; dropping it leaves the task
/// running, `stop()` shuts it down cleanly.
pub struct ConsciousWorkerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl ConsciousWorkerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// One pass over the unprocessed backlog.  Returns how many derivative
/// memories were produced.  Classifier failures leave the row unprocessed
/// so a later pass can pick it up.
pub async fn run_conscious_pass(
    store: &Arc<dyn MemoryStore>,
    classifier: &Arc<dyn ConversationClassifier>,
    namespace: &str,
    batch_size: usize,
) -> Result<usize> {
    let pending = store
        .list_unprocessed_chat_history(namespace, batch_size)
        .await?;
    let mut produced = 0usize;

    for entry in pending {
        let request = ClassifyRequest {
            chat_id: entry.id.clone(),
            user_input: entry.user_input.clone(),
            ai_output: entry.ai_output.clone(),
            context: None,
        };
        match classifier.process_conversation(&request).await {
            Ok(processed) => {
                store
                    .store_processed_memory(
                        &processed,
                        &entry.id,
                        namespace,
                        RetentionType::Conscious,
                    )
                    .await?;
                let ids = [entry.id.clone()];
                store.mark_chat_history_processed(&ids).await?;
                produced += 1;
            }
            Err(err) => {
                warn!(chat_id = %entry.id, error = %err, "deferred classification failed, will retry later");
            }
        }
    }

    if produced > 0 {
        debug!(produced, namespace, "conscious pass produced memories");
    }
    Ok(produced)
}

pub fn spawn_conscious_worker(
    store: Arc<dyn MemoryStore>,
    classifier: Arc<dyn ConversationClassifier>,
    namespace: String,
    interval_ms: u64,
    batch_size: usize,
) -> ConsciousWorkerHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) =
                        run_conscious_pass(&store, &classifier, &namespace, batch_size).await
                    {
                        warn!(error = %err, "conscious pass failed");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
    ConsciousWorkerHandle { shutdown, handle }
}
