//! Dry-run publisher
//!
//! Stands in for the real network transport: logs the item, sleeps a little
//! the way a real API call would, and hands back a synthetic id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use rand::Rng;
use tracing::info;

use super::Publisher;

#[derive(Debug, Default)]
pub struct DryRunPublisher {
    counter: AtomicU64,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, text: &str, reply_to: Option<&str>) -> Result<String> {
        let delay = rand::rng().random_range(0..1000);
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let id = format!("dry-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        info!(%id, ?reply_to, chars = text.chars().count(), "dry-run publish");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_unique_and_sequential() {
        let publisher = DryRunPublisher::new();
        let first = publisher.publish("one", None).await.unwrap();
        let second = publisher.publish("two", Some(&first)).await.unwrap();

        assert_eq!(first, "dry-1");
        assert_eq!(second, "dry-2");
    }
}
