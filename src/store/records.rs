use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{Actor, Feed, Guid, Item, ItemFilter};

// ============================================================================
// Error Types
// ============================================================================

/// Store-layer errors.
///
/// Not-found is never an error here: point and prefix lookups express
/// absence through their result shape (`None` or an empty item map) and
/// callers branch on emptiness.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A bad key or identity was passed to the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Opaque backend failure, propagated unchanged.
    #[error("store backend error: {0}")]
    Backend(#[from] sqlx::Error),

    /// A record body failed to serialize or deserialize.
    #[error("record serialization failed: {0}")]
    Record(#[from] serde_json::Error),

    /// A stored record decoded but carries values the aggregate rejects.
    #[error("malformed stored record: {0}")]
    Corrupt(String),
}

// ============================================================================
// Record Shapes
// ============================================================================

/// Sort key of every feed record; the partition key is the feed source.
pub(crate) const FEED_SORT_KEY: &str = "rss";

/// Sort key of an item record under its feed's partition.
pub(crate) fn item_sort_key(rss_id: &str, guid: &Guid) -> String {
    format!("{rss_id}#{guid}")
}

/// Prefix covering every item record of one feed.
pub(crate) fn item_key_prefix(rss_id: &Uuid) -> String {
    format!("{rss_id}#")
}

/// Flat persisted form of a feed's scalar fields.
///
/// This module is the only code that knows the flat record layout; the
/// physical schema can change without touching the aggregate.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FeedRecord {
    /// Partition key: the feed source.
    pub id: String,
    #[serde(rename = "sortKey")]
    pub sort_key: String,
    pub rss_id: String,
    pub source: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub last_build_date: i64,
    pub item_filter: ItemFilterRecord,
    pub create_by: ActorRecord,
    pub create_at: i64,
    pub update_by: ActorRecord,
    pub update_at: i64,
}

/// Flat persisted form of one item.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ItemRecord {
    /// Partition key: the owning feed's source.
    pub id: String,
    #[serde(rename = "sortKey")]
    pub sort_key: String,
    pub rss_id: String,
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub pub_date: i64,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ItemFilterRecord {
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ActorRecord {
    pub id: String,
    pub name: String,
}

// ============================================================================
// Aggregate <-> Record Translation
// ============================================================================

impl FeedRecord {
    pub(crate) fn from_feed(feed: &Feed) -> Self {
        FeedRecord {
            id: feed.source.clone(),
            sort_key: FEED_SORT_KEY.to_owned(),
            rss_id: feed.id.to_string(),
            source: feed.source.clone(),
            title: feed.title.clone(),
            link: feed.link.clone(),
            description: feed.description.clone(),
            language: feed.language.clone(),
            last_build_date: feed.last_build_date.timestamp(),
            item_filter: ItemFilterRecord {
                include_keywords: feed.item_filter.include_keywords.clone(),
                exclude_keywords: feed.item_filter.exclude_keywords.clone(),
            },
            create_by: ActorRecord::from_actor(&feed.created_by),
            create_at: feed.created_at.map(|t| t.timestamp()).unwrap_or(0),
            update_by: ActorRecord::from_actor(&feed.updated_by),
            update_at: feed.updated_at.map(|t| t.timestamp()).unwrap_or(0),
        }
    }

    /// Rebuilds the aggregate from a feed record plus any loaded items.
    pub(crate) fn into_feed(self, items: Vec<ItemRecord>) -> Result<Feed, StoreError> {
        let id = self
            .rss_id
            .parse::<Uuid>()
            .map_err(|e| StoreError::Corrupt(format!("rss_id {:?}: {e}", self.rss_id)))?;

        let mut item_map = std::collections::HashMap::new();
        for record in items {
            let item = record.into_item()?;
            item_map.insert(item.guid.clone(), item);
        }

        Ok(Feed {
            id,
            source: self.source,
            title: self.title,
            link: self.link,
            description: self.description,
            language: self.language,
            last_build_date: from_epoch(self.last_build_date)?,
            items: item_map,
            item_filter: ItemFilter::new(
                self.item_filter.include_keywords,
                self.item_filter.exclude_keywords,
            ),
            created_by: self.create_by.into_actor(),
            created_at: from_optional_epoch(self.create_at)?,
            updated_by: self.update_by.into_actor(),
            updated_at: from_optional_epoch(self.update_at)?,
        })
    }
}

impl ItemRecord {
    pub(crate) fn from_item(source: &str, rss_id: &str, item: &Item) -> Self {
        ItemRecord {
            id: source.to_owned(),
            sort_key: item_sort_key(rss_id, &item.guid),
            rss_id: rss_id.to_owned(),
            guid: item.guid.as_str().to_owned(),
            title: item.title.clone(),
            link: item.link.clone(),
            description: item.description.clone(),
            author: item.author.clone(),
            pub_date: item.pub_date.timestamp(),
            tags: item.tags.clone(),
        }
    }

    pub(crate) fn into_item(self) -> Result<Item, StoreError> {
        Ok(Item {
            guid: Guid::new(self.guid),
            title: self.title,
            link: self.link,
            description: self.description,
            author: self.author,
            pub_date: from_epoch(self.pub_date)?,
            tags: self.tags,
        })
    }
}

impl ActorRecord {
    fn from_actor(actor: &Actor) -> Self {
        ActorRecord {
            id: actor.id.clone(),
            name: actor.name.clone(),
        }
    }

    fn into_actor(self) -> Actor {
        Actor {
            id: self.id,
            name: self.name,
        }
    }
}

fn from_epoch(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {secs} out of range")))
}

/// Audit timestamps persist as 0 while unset (before the first save).
fn from_optional_epoch(secs: i64) -> Result<Option<DateTime<Utc>>, StoreError> {
    if secs == 0 {
        return Ok(None);
    }
    from_epoch(secs).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn feed_with_item() -> Feed {
        let mut feed = Feed::new(
            "Example Feed",
            "example.com",
            "https://example.com/rss",
            "a feed",
            "en",
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        )
        .unwrap();
        feed.set_item_filter(vec!["go".to_string()], vec!["ads".to_string()]);

        let mut item = Item::new(
            Guid::from("https://example.com/posts/1"),
            "Go 1.23 released",
            "https://example.com/posts/1",
            "release notes",
            "core team",
            Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        )
        .unwrap();
        item.add_tag("release");
        feed.add_or_update_item(item);
        feed
    }

    #[test]
    fn feed_round_trips_through_records() {
        let feed = feed_with_item();
        let record = FeedRecord::from_feed(&feed);
        assert_eq!(record.id, "example.com");
        assert_eq!(record.sort_key, "rss");
        assert_eq!(record.create_at, 0);

        let items: Vec<ItemRecord> = feed
            .items
            .values()
            .map(|i| ItemRecord::from_item(&feed.source, &record.rss_id, i))
            .collect();
        let rebuilt = record.into_feed(items).unwrap();
        assert_eq!(rebuilt, feed);
    }

    #[test]
    fn item_sort_key_joins_feed_id_and_guid() {
        let feed = feed_with_item();
        let record = FeedRecord::from_feed(&feed);
        let item = feed.items.values().next().unwrap();
        let item_record = ItemRecord::from_item(&feed.source, &record.rss_id, item);
        assert_eq!(
            item_record.sort_key,
            format!("{}#https://example.com/posts/1", feed.id)
        );
        assert_eq!(item_record.tags, vec!["release".to_string()]);
    }

    #[test]
    fn corrupt_rss_id_is_rejected() {
        let feed = feed_with_item();
        let mut record = FeedRecord::from_feed(&feed);
        record.rss_id = "not-a-uuid".to_owned();
        assert!(matches!(
            record.into_feed(vec![]),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn unset_audit_fields_survive_the_round_trip() {
        let feed = feed_with_item();
        let record = FeedRecord::from_feed(&feed);
        let rebuilt = record.into_feed(vec![]).unwrap();
        assert!(rebuilt.created_by.is_unset());
        assert_eq!(rebuilt.created_at, None);
    }
}
