//! Boundary between the feed-fetching collaborator and the aggregate.
//!
//! The fetcher (HTTP + XML parsing, out of scope here) hands over a
//! [`FetchedFeed`]; this module derives the natural key from the feed
//! URL's host, assigns guids, picks the last build date, and assembles a
//! [`Feed`]. A bad entry never sinks the whole feed: per-item failures
//! are logged and skipped.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::domain::{Feed, FieldError, Guid, Item};

/// What the fetch collaborator returns for one feed URL.
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    /// The URL the feed was fetched from; becomes the aggregate's link
    /// and, via its host, the source.
    pub url: String,
    pub title: String,
    pub description: String,
    pub language: String,
    /// Feed-level update stamp, used only when no entry carries a date.
    pub updated: Option<DateTime<Utc>>,
    pub items: Vec<FetchedItem>,
}

/// One parsed entry as delivered by the fetch collaborator.
#[derive(Debug, Clone, Default)]
pub struct FetchedItem {
    /// Native identifier; may be empty, in which case the link stands in.
    pub guid: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    pub pub_date: Option<DateTime<Utc>>,
}

/// Feed-level ingest failures. Item-level problems are logged and
/// skipped instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid feed url {url:?}")]
    InvalidUrl { url: String },

    #[error(transparent)]
    Field(#[from] FieldError),
}

/// The feed's natural key: the host of its URL.
pub fn source_from_url(url: &str) -> Result<String, IngestError> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .ok_or_else(|| IngestError::InvalidUrl {
            url: url.to_owned(),
        })
}

/// An entry's identity: its native guid, else its link with the query
/// string stripped (tracking parameters must not split identities).
pub fn derive_guid(item: &FetchedItem) -> Option<Guid> {
    if !item.guid.is_empty() {
        return Some(Guid::new(item.guid.clone()));
    }

    let mut link = Url::parse(&item.link).ok()?;
    link.set_query(None);
    Some(Guid::new(link.to_string()))
}

/// Newest entry date, falling back to the feed-level update stamp.
pub fn derive_last_build_date(fetched: &FetchedFeed) -> Option<DateTime<Utc>> {
    fetched
        .items
        .iter()
        .filter_map(|item| item.pub_date)
        .max()
        .or(fetched.updated)
}

/// Assembles the aggregate from a fetched feed.
pub fn build_feed(fetched: FetchedFeed) -> Result<Feed, IngestError> {
    let source = source_from_url(&fetched.url)?;
    let last_build_date = derive_last_build_date(&fetched);

    let mut feed = Feed::new(
        fetched.title,
        source,
        fetched.url,
        fetched.description,
        fetched.language,
        last_build_date,
    )?;

    for entry in fetched.items {
        let Some(guid) = derive_guid(&entry) else {
            warn!(title = %entry.title, link = %entry.link, "cannot derive a guid, skipping entry");
            continue;
        };
        let Some(pub_date) = entry.pub_date else {
            warn!(title = %entry.title, "entry has no publish date, skipping");
            continue;
        };

        match Item::new(
            guid,
            entry.title,
            entry.link,
            entry.description,
            entry.author,
            pub_date,
        ) {
            Ok(item) => feed.add_or_update_item(item),
            Err(err) => {
                warn!(error = %err, "entry failed validation, skipping");
            }
        }
    }

    Ok(feed)
}
