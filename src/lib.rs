//! Feed reconciliation and storage core for an RSS ingestion pipeline.
//!
//! The pipeline fetches feeds, deduplicates and filters their items,
//! persists them, and forwards change notifications. This crate holds the
//! parts between the fetcher and the transport:
//!
//! - [`domain`] — the feed aggregate: required-field invariants, guid-keyed
//!   items, and the include/exclude keyword filter applied on insertion
//! - [`store`] — the single-table repository mapping the aggregate onto a
//!   flat partition/sort-key record layout
//! - [`reconcile`] — the clean/merge engine computing which fetched items
//!   are genuinely new, with an idempotent-write short-circuit
//! - [`envelope`] — the size-bounded message codec: inline JSON under
//!   256 KiB, gzip + base64 above it
//! - [`ingest`] — conversion from the fetch collaborator's parsed-feed
//!   shape into the aggregate
//! - [`publish`] — the transport seam and paced batch publishing
//!
//! Entry points, HTTP fetching, XML parsing, and the transport itself are
//! collaborators behind narrow interfaces and live elsewhere.

pub mod domain;
pub mod envelope;
pub mod ingest;
pub mod publish;
pub mod reconcile;
pub mod store;

pub use domain::{Actor, Feed, FieldError, Guid, Item, ItemFilter};
pub use envelope::{CodecError, Envelope};
pub use store::{FeedRepository, FeedStore, StoreError};
