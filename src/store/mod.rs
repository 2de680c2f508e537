//! Single-table persistence for the feed aggregate.
//!
//! One flat `(partition_key, sort_key)` table holds every record: a feed
//! record under sort key `"rss"` and one item record per entry under
//! `"{feed_id}#{guid}"`, both keyed by the feed's source. [`KvStore`] is
//! the generic table layer; the record shapes and the aggregate
//! translation live in `records`; [`FeedStore`] is the repository built
//! on top.

mod kv;
mod records;
mod repository;

pub use kv::{KvStore, RecordKey, DELETE_BATCH_SIZE};
pub use records::StoreError;
pub use repository::{FeedRepository, FeedStore};
