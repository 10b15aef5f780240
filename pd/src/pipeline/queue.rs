//! Draft queue adapter
//!
//! External producers append ready batches under a single key; the daemon
//! pops the head batch under an optimistic commit so two instances cannot
//! double-publish the same draft.

use std::sync::Arc;

use async_trait::async_trait;
use eyre::{Context, Result};
use tracing::debug;
use watchstore::{KvStore, TxnDecision, WriteOp, transact};

use super::{ContentPipeline, PipelineOutcome};

pub struct QueuePipeline {
    store: Arc<dyn KvStore>,
    key: String,
}

impl QueuePipeline {
    pub fn new(store: Arc<dyn KvStore>, key_prefix: &str) -> Self {
        Self {
            store,
            key: format!("{key_prefix}draft_queue"),
        }
    }

    /// Append a batch to the tail of the queue (producer side)
    pub async fn enqueue(&self, batch: Vec<String>) -> Result<()> {
        transact(self.store.as_ref(), &[&self.key], |watched| {
            let mut queue = decode(watched.get(&self.key));
            queue.push(batch.clone());
            let Ok(json) = serde_json::to_string(&queue) else {
                return TxnDecision::Abort(());
            };
            TxnDecision::Commit(vec![WriteOp::set(&self.key, json)], ())
        })
        .await
        .context("failed to enqueue draft batch")?;
        debug!(key = %self.key, "draft batch enqueued");
        Ok(())
    }

    /// Number of batches waiting in the queue
    pub async fn len(&self) -> Result<usize> {
        let raw = self
            .store
            .get(&self.key)
            .await
            .context("failed to read draft queue")?;
        Ok(decode(raw.as_deref()).len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// A corrupt queue value is treated as empty rather than wedging the loop.
fn decode(raw: Option<&str>) -> Vec<Vec<String>> {
    raw.and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default()
}

#[async_trait]
impl ContentPipeline for QueuePipeline {
    async fn produce(&self) -> Result<PipelineOutcome> {
        let popped = transact(self.store.as_ref(), &[&self.key], |watched| {
            let mut queue = decode(watched.get(&self.key));
            if queue.is_empty() {
                return TxnDecision::Abort(None);
            }
            let head = queue.remove(0);
            let Ok(json) = serde_json::to_string(&queue) else {
                return TxnDecision::Abort(None);
            };
            TxnDecision::Commit(vec![WriteOp::set(&self.key, json)], Some(head))
        })
        .await
        .context("failed to pop draft batch")?;

        match popped {
            Some(items) => {
                debug!(items = items.len(), "draft batch dequeued");
                Ok(PipelineOutcome::Batch(items))
            }
            None => Ok(PipelineOutcome::Rerun),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchstore::MemoryStore;

    fn queue() -> QueuePipeline {
        QueuePipeline::new(Arc::new(MemoryStore::new()), "test:")
    }

    #[tokio::test]
    async fn test_empty_queue_reports_rerun() {
        let pipeline = queue();
        assert_eq!(pipeline.produce().await.unwrap(), PipelineOutcome::Rerun);
    }

    #[tokio::test]
    async fn test_batches_come_out_in_fifo_order() {
        let pipeline = queue();
        pipeline.enqueue(vec!["a1".into(), "a2".into()]).await.unwrap();
        pipeline.enqueue(vec!["b1".into()]).await.unwrap();
        assert_eq!(pipeline.len().await.unwrap(), 2);

        assert_eq!(
            pipeline.produce().await.unwrap(),
            PipelineOutcome::Batch(vec!["a1".into(), "a2".into()])
        );
        assert_eq!(
            pipeline.produce().await.unwrap(),
            PipelineOutcome::Batch(vec!["b1".into()])
        );
        assert_eq!(pipeline.produce().await.unwrap(), PipelineOutcome::Rerun);
    }

    #[tokio::test]
    async fn test_corrupt_queue_value_reads_as_empty() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        store.set("test:draft_queue", "not json", None).await.unwrap();
        let pipeline = QueuePipeline::new(store, "test:");

        assert!(pipeline.is_empty().await.unwrap());
        assert_eq!(pipeline.produce().await.unwrap(), PipelineOutcome::Rerun);
    }
}
