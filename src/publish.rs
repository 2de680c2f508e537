//! Outbound boundary: hands encoded messages to the pub/sub transport.
//!
//! The transport itself (topic semantics, retry, ordering) is a
//! collaborator behind [`Publisher`]. Batch publishing is paced by an
//! injected [`Pacer`] strategy rather than a free function sleeping on
//! real time, so batch-size-driven pacing stays deterministic in tests.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::domain::Feed;
use crate::envelope::{Envelope, Subscribe};

/// The pub/sub transport seam. Messages are already-encoded strings.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &str) -> Result<()>;
}

/// Pacing strategy applied between publish batches.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn pause(&self);
}

/// Sleeps a fixed delay per pause.
pub struct FixedDelay(pub Duration);

#[async_trait]
impl Pacer for FixedDelay {
    async fn pause(&self) {
        tokio::time::sleep(self.0).await;
    }
}

/// Envelope-encodes a feed and hands it to the transport.
pub async fn publish_feed<P>(publisher: &P, feed: Feed) -> Result<()>
where
    P: Publisher + ?Sized,
{
    let source = feed.source.clone();
    let message = Envelope::encode(feed)
        .and_then(|envelope| envelope.to_message())
        .context("failed to encode feed envelope")?;

    publisher.publish(&message).await?;
    info!(source = %source, "feed published");
    Ok(())
}

/// Publishes one [`Subscribe`] message per feed URL, pausing after every
/// `batch_size` messages to respect downstream rate limits.
pub async fn publish_subscriptions<P, T>(
    publisher: &P,
    pacer: &T,
    batch_size: usize,
    feed_urls: &[String],
) -> Result<()>
where
    P: Publisher + ?Sized,
    T: Pacer + ?Sized,
{
    for (i, feed_url) in feed_urls.iter().enumerate() {
        let message = serde_json::to_string(&Subscribe {
            feed_url: feed_url.clone(),
        })
        .context("failed to encode subscribe message")?;

        publisher.publish(&message).await?;

        if batch_size > 0 && (i + 1) % batch_size == 0 {
            pacer.pause().await;
        }
    }
    Ok(())
}
