//! The clean/merge engine: decides which freshly fetched items are
//! genuinely new relative to durable storage, and persists feed updates
//! with an idempotent-write short-circuit.
//!
//! Dedup trades one point read per fetched item for avoiding a bulk
//! prefix scan, which wins when feeds are large and only a few items are
//! new per poll. Guid equality is the sole identity and change test;
//! content drift under the same guid is not detected.

use tracing::{debug, info, warn};

use crate::domain::{Actor, Feed};
use crate::store::{FeedRepository, StoreError};

/// Existence check by source.
///
/// A lookup error counts as "unknown / not found" and is logged; it never
/// counts as "exists". A transient read failure therefore re-processes
/// the feed rather than silently dropping its items.
pub async fn exists<R>(repo: &R, feed: &Feed) -> (bool, Option<Feed>)
where
    R: FeedRepository + ?Sized,
{
    match repo.find_by_source(&feed.source).await {
        Ok(Some(stored)) => (true, Some(stored)),
        Ok(None) => (false, None),
        Err(err) => {
            warn!(
                source = %feed.source,
                error = %err,
                "existence check failed, treating feed as not stored"
            );
            (false, None)
        }
    }
}

/// Computes the feed diff for a freshly fetched feed.
///
/// When the source was never stored, the fetched feed is returned
/// unchanged — everything in it is new. Otherwise the stored feed adopts
/// the fetched last build date and items (through its item filter), and
/// the returned feed carries the merged scalars plus only the fetched
/// items whose guid lookup missed. The merged feed keeps the stored
/// identity; a feed is re-identified by source, never by id.
pub async fn reconcile<R>(repo: &R, fetched: Feed) -> Feed
where
    R: FeedRepository + ?Sized,
{
    let (found, stored) = exists(repo, &fetched).await;
    info!(source = %fetched.source, exists = found, "checked stored feed");

    let Some(mut merged) = stored else {
        return fetched;
    };

    let _ = merged.set_last_build_date(Some(fetched.last_build_date));
    for item in fetched.items.values() {
        merged.add_or_update_item(item.clone());
    }

    let mut output = merged.clone();
    output.items.clear();

    for (guid, item) in &fetched.items {
        match repo.find_item_by_guid(&merged, guid).await {
            Ok(found) if found.items.is_empty() => {
                output.items.insert(guid.clone(), item.clone());
            }
            Ok(_) => {
                debug!(source = %fetched.source, guid = %guid, "item already stored, not forwarded");
            }
            Err(err) => {
                // Conservative: skip rather than duplicate-forward.
                warn!(
                    source = %fetched.source,
                    guid = %guid,
                    error = %err,
                    "item lookup failed, treating item as already stored"
                );
            }
        }
    }

    output
}

/// Persists a feed unless nothing that matters has changed.
///
/// When a stored feed exists and both the last build date and the item
/// filter are unchanged, the write is skipped entirely and the stored
/// feed is returned as-is.
pub async fn write<R>(repo: &R, feed: Feed, actor: &Actor) -> Result<Feed, StoreError>
where
    R: FeedRepository + ?Sized,
{
    let (found, stored) = exists(repo, &feed).await;
    info!(source = %feed.source, exists = found, "checked stored feed before save");

    if let Some(stored) = stored {
        if !should_update(&stored, &feed) {
            info!(source = %feed.source, "feed is up to date, skipping save");
            return Ok(stored);
        }
    }

    repo.save(feed, actor).await
}

/// One fetch cycle: reconcile, persist the diff, return the diff for
/// downstream forwarding.
pub async fn process<R>(repo: &R, fetched: Feed, actor: &Actor) -> Result<Feed, StoreError>
where
    R: FeedRepository + ?Sized,
{
    let diff = reconcile(repo, fetched).await;
    write(repo, diff.clone(), actor).await?;
    Ok(diff)
}

fn should_update(stored: &Feed, incoming: &Feed) -> bool {
    stored.last_build_date != incoming.last_build_date
        || stored.item_filter != incoming.item_filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Guid, Item};
    use crate::store::FeedStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn actor() -> Actor {
        Actor::new("example.com", "example.com")
    }

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, 12, 0, 0).unwrap()
    }

    fn fetched_feed(day: u32, guids: &[&str]) -> Feed {
        let mut feed = Feed::new(
            "Example Feed",
            "example.com",
            "https://example.com/rss",
            "a feed",
            "en",
            Some(date(day)),
        )
        .unwrap();
        for guid in guids {
            feed.add_or_update_item(
                Item::new(
                    Guid::from(*guid),
                    format!("Post {guid}"),
                    format!("https://example.com/{guid}"),
                    "",
                    "",
                    date(day),
                )
                .unwrap(),
            );
        }
        feed
    }

    async fn test_store() -> FeedStore {
        FeedStore::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn unknown_source_passes_through_unchanged() {
        let store = test_store().await;
        let fetched = fetched_feed(1, &["a", "b"]);

        let diff = reconcile(&store, fetched.clone()).await;
        assert_eq!(diff, fetched);
    }

    #[tokio::test]
    async fn only_unseen_items_survive_reconciliation() {
        let store = test_store().await;
        let stored = store
            .save(fetched_feed(1, &["a", "b"]), &actor())
            .await
            .unwrap();

        let fetched = fetched_feed(2, &["a", "b", "c"]);
        let diff = reconcile(&store, fetched.clone()).await;

        let guids: Vec<&str> = diff.items.keys().map(Guid::as_str).collect();
        assert_eq!(guids, vec!["c"]);
        assert_eq!(diff.last_build_date, fetched.last_build_date);
        assert_eq!(diff.id, stored.id, "stored identity is reused");
        assert_eq!(diff.created_by, stored.created_by);
    }

    #[tokio::test]
    async fn second_cycle_with_same_feed_yields_empty_diff() {
        let store = test_store().await;

        let first = process(&store, fetched_feed(2, &["a", "b"]), &actor())
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);

        let second = process(&store, fetched_feed(2, &["a", "b"]), &actor())
            .await
            .unwrap();
        assert!(second.items.is_empty());
    }

    #[tokio::test]
    async fn write_skips_save_when_nothing_changed() {
        let store = test_store().await;
        let stored = store
            .save(fetched_feed(1, &["a"]), &actor())
            .await
            .unwrap();

        let mut unchanged = stored.clone();
        unchanged.items.clear();
        let other_actor = Actor::new("editor", "editor");
        let result = write(&store, unchanged, &other_actor).await.unwrap();

        // The save was skipped: the stored audit identity is untouched.
        assert_eq!(result.updated_by, actor());
        let reloaded = store
            .find_by_source("example.com")
            .await
            .unwrap()
            .expect("still stored");
        assert_eq!(reloaded.updated_by, actor());
    }

    #[tokio::test]
    async fn write_saves_when_last_build_date_moves() {
        let store = test_store().await;
        let stored = store
            .save(fetched_feed(1, &["a"]), &actor())
            .await
            .unwrap();

        let mut moved = stored.clone();
        moved.set_last_build_date(Some(date(3))).unwrap();
        let other_actor = Actor::new("editor", "editor");
        let result = write(&store, moved, &other_actor).await.unwrap();

        assert_eq!(result.updated_by, other_actor);
    }

    #[tokio::test]
    async fn write_saves_when_item_filter_changes() {
        let store = test_store().await;
        let stored = store
            .save(fetched_feed(1, &["a"]), &actor())
            .await
            .unwrap();

        let mut refiltered = stored.clone();
        refiltered.set_item_filter(vec!["go".to_string()], vec![]);
        let result = write(&store, refiltered, &actor()).await.unwrap();

        let reloaded = store
            .find_by_source("example.com")
            .await
            .unwrap()
            .expect("still stored");
        assert_eq!(
            reloaded.item_filter.include_keywords,
            vec!["go".to_string()]
        );
        assert_eq!(result.item_filter, reloaded.item_filter);
    }

    // ------------------------------------------------------------------
    // Failure-policy doubles
    // ------------------------------------------------------------------

    /// Delegates to a real store but fails every per-item lookup.
    struct FlakyItemLookups {
        inner: FeedStore,
    }

    #[async_trait]
    impl FeedRepository for FlakyItemLookups {
        async fn find_by_source(&self, source: &str) -> Result<Option<Feed>, StoreError> {
            self.inner.find_by_source(source).await
        }
        async fn find_all(&self) -> Result<Vec<Feed>, StoreError> {
            self.inner.find_all().await
        }
        async fn find_items(&self, feed: &Feed) -> Result<Feed, StoreError> {
            self.inner.find_items(feed).await
        }
        async fn find_item_by_guid(&self, _: &Feed, _: &Guid) -> Result<Feed, StoreError> {
            Err(StoreError::InvalidArgument("injected failure"))
        }
        async fn save(&self, feed: Feed, actor: &Actor) -> Result<Feed, StoreError> {
            self.inner.save(feed, actor).await
        }
        async fn delete(&self, feed: &Feed) -> Result<(), StoreError> {
            self.inner.delete(feed).await
        }
    }

    /// Fails every feed-level lookup.
    struct DownStore;

    #[async_trait]
    impl FeedRepository for DownStore {
        async fn find_by_source(&self, _: &str) -> Result<Option<Feed>, StoreError> {
            Err(StoreError::InvalidArgument("injected failure"))
        }
        async fn find_all(&self) -> Result<Vec<Feed>, StoreError> {
            Ok(Vec::new())
        }
        async fn find_items(&self, feed: &Feed) -> Result<Feed, StoreError> {
            Ok(feed.clone())
        }
        async fn find_item_by_guid(&self, feed: &Feed, _: &Guid) -> Result<Feed, StoreError> {
            Ok(feed.clone())
        }
        async fn save(&self, feed: Feed, _: &Actor) -> Result<Feed, StoreError> {
            Ok(feed)
        }
        async fn delete(&self, _: &Feed) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_item_lookup_is_treated_as_already_stored() {
        let inner = test_store().await;
        inner
            .save(fetched_feed(1, &["a"]), &actor())
            .await
            .unwrap();
        let flaky = FlakyItemLookups { inner };

        let diff = reconcile(&flaky, fetched_feed(2, &["a", "b", "c"])).await;
        assert!(
            diff.items.is_empty(),
            "lookup failures must never duplicate-forward items"
        );
        assert_eq!(diff.last_build_date, date(2));
    }

    #[tokio::test]
    async fn failed_existence_check_counts_as_not_stored() {
        let fetched = fetched_feed(1, &["a"]);
        let (found, stored) = exists(&DownStore, &fetched).await;
        assert!(!found);
        assert!(stored.is_none());

        // The whole fetched feed is then considered new.
        let diff = reconcile(&DownStore, fetched.clone()).await;
        assert_eq!(diff, fetched);
    }
}
