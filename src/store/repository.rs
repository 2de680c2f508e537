use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{Actor, Feed, Guid};

use super::kv::KvStore;
use super::records::{item_key_prefix, item_sort_key, FeedRecord, ItemRecord, StoreError, FEED_SORT_KEY};

/// Persistence seam for the feed aggregate.
///
/// Absence is an empty result, never an error: `find_by_source` returns
/// `None` on a miss and `find_item_by_guid` returns a feed with an empty
/// item map. Callers branch on emptiness.
#[async_trait]
pub trait FeedRepository: Send + Sync {
    /// Point lookup of the feed record only. Items are deliberately not
    /// loaded here to bound read cost; use [`find_items`] or
    /// [`find_item_by_guid`] when item data is needed.
    ///
    /// [`find_items`]: FeedRepository::find_items
    /// [`find_item_by_guid`]: FeedRepository::find_item_by_guid
    async fn find_by_source(&self, source: &str) -> Result<Option<Feed>, StoreError>;

    /// Every stored feed, via the sort-key index. Item maps are empty.
    async fn find_all(&self) -> Result<Vec<Feed>, StoreError>;

    /// All item records under the feed's prefix, merged onto the passed
    /// feed's scalar fields.
    async fn find_items(&self, feed: &Feed) -> Result<Feed, StoreError>;

    /// Exactly zero or one item by exact key; a miss is an empty item map.
    async fn find_item_by_guid(&self, feed: &Feed, guid: &Guid) -> Result<Feed, StoreError>;

    /// Writes the feed record, then every item record individually.
    ///
    /// Deliberately not transactional: a failure partway through leaves
    /// the feed record and a subset of item records persisted. Re-running
    /// the whole save is safe, every write is an idempotent upsert.
    async fn save(&self, feed: Feed, actor: &Actor) -> Result<Feed, StoreError>;

    /// Cascading delete: item records first (in bounded batches), the feed
    /// record last, so a crash mid-delete never leaves a feed record whose
    /// items were not at least attempted.
    async fn delete(&self, feed: &Feed) -> Result<(), StoreError>;
}

/// Single-table repository over [`KvStore`].
#[derive(Clone)]
pub struct FeedStore {
    kv: KvStore,
}

impl FeedStore {
    /// Opens the backing store; `":memory:"` for tests.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Ok(FeedStore {
            kv: KvStore::open(path).await?,
        })
    }
}

#[async_trait]
impl FeedRepository for FeedStore {
    async fn find_by_source(&self, source: &str) -> Result<Option<Feed>, StoreError> {
        if source.is_empty() {
            return Err(StoreError::InvalidArgument("source is empty"));
        }

        match self.kv.get::<FeedRecord>(source, FEED_SORT_KEY).await? {
            Some(record) => Ok(Some(record.into_feed(Vec::new())?)),
            None => Ok(None),
        }
    }

    async fn find_all(&self) -> Result<Vec<Feed>, StoreError> {
        let records: Vec<FeedRecord> = self.kv.query_by_sort_key(FEED_SORT_KEY).await?;
        records
            .into_iter()
            .map(|record| record.into_feed(Vec::new()))
            .collect()
    }

    async fn find_items(&self, feed: &Feed) -> Result<Feed, StoreError> {
        if feed.source.is_empty() {
            return Err(StoreError::InvalidArgument("feed source is empty"));
        }

        let records: Vec<ItemRecord> = self
            .kv
            .query_prefix(&feed.source, &item_key_prefix(&feed.id))
            .await?;

        let mut out = feed.clone();
        out.items = records
            .into_iter()
            .map(|record| record.into_item().map(|item| (item.guid.clone(), item)))
            .collect::<Result<_, _>>()?;
        Ok(out)
    }

    async fn find_item_by_guid(&self, feed: &Feed, guid: &Guid) -> Result<Feed, StoreError> {
        if feed.id.is_nil() {
            return Err(StoreError::InvalidArgument("feed id is unset"));
        }
        if guid.is_empty() {
            return Err(StoreError::InvalidArgument("guid is empty"));
        }

        let sort_key = item_sort_key(&feed.id.to_string(), guid);
        let record: Option<ItemRecord> = self.kv.get(&feed.source, &sort_key).await?;

        let mut out = feed.clone();
        out.items.clear();
        if let Some(record) = record {
            let item = record.into_item()?;
            out.items.insert(item.guid.clone(), item);
        }
        Ok(out)
    }

    async fn save(&self, mut feed: Feed, actor: &Actor) -> Result<Feed, StoreError> {
        if feed.id.is_nil() {
            return Err(StoreError::InvalidArgument("feed id is unset"));
        }

        let now = Utc::now();
        if feed.created_by.is_unset() {
            feed.created_by = actor.clone();
            feed.created_at = Some(now);
        }
        feed.updated_by = actor.clone();
        feed.updated_at = Some(now);

        let record = FeedRecord::from_feed(&feed);
        self.kv.put(&record.id, &record.sort_key, &record).await?;

        for item in feed.items.values() {
            let item_record = ItemRecord::from_item(&feed.source, &record.rss_id, item);
            self.kv
                .put(&item_record.id, &item_record.sort_key, &item_record)
                .await?;
        }

        Ok(feed)
    }

    async fn delete(&self, feed: &Feed) -> Result<(), StoreError> {
        if feed.id.is_nil() {
            return Err(StoreError::InvalidArgument("feed id is unset"));
        }
        if feed.source.is_empty() {
            return Err(StoreError::InvalidArgument("feed source is empty"));
        }

        let keys = self
            .kv
            .query_keys_by_prefix(&feed.source, &item_key_prefix(&feed.id))
            .await?;
        let batches = self.kv.batch_delete(&keys).await?;
        tracing::debug!(
            source = %feed.source,
            items = keys.len(),
            batches,
            "deleted item records"
        );

        self.kv.delete(&feed.source, FEED_SORT_KEY).await
    }
}
