//! Content pipeline seam
//!
//! Content generation is an external collaborator; the loop only needs "give
//! me a batch that is ready to publish, or tell me to come back later".

mod queue;

pub use queue::QueuePipeline;

use async_trait::async_trait;
use eyre::Result;

/// What the pipeline produced this cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// A batch of items ready to publish, in thread order
    Batch(Vec<String>),
    /// Nothing ready this cycle; try again on a later tick
    Rerun,
}

/// Source of ready-to-publish content batches
#[async_trait]
pub trait ContentPipeline: Send + Sync {
    /// Produce the next batch, or [`PipelineOutcome::Rerun`] when nothing is
    /// ready. An error also means "nothing to publish this cycle": the
    /// caller leaves the slot unexecuted and moves on.
    async fn produce(&self) -> Result<PipelineOutcome>;
}
