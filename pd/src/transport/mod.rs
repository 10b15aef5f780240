//! Publishing transport seam
//!
//! Posting to the network is an external collaborator. The loop only needs
//! to publish one item at a time and thread replies by id.

mod dry_run;

pub use dry_run::DryRunPublisher;

use async_trait::async_trait;
use eyre::Result;

/// Publishes one item and returns its identifier for reply threading
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `text`, optionally as a reply to a previously returned id
    async fn publish(&self, text: &str, reply_to: Option<&str>) -> Result<String>;
}
