use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::FieldError;

/// Stable identity of an item within its feed.
///
/// Derived at the ingest boundary from the entry's native identifier, or
/// from its link with the query string stripped when no identifier is
/// present. Immutable once assigned; items are keyed by value equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn new(value: impl Into<String>) -> Self {
        Guid(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Guid {
    fn from(value: &str) -> Self {
        Guid(value.to_owned())
    }
}

impl From<String> for Guid {
    fn from(value: String) -> Self {
        Guid(value)
    }
}

/// A single feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub guid: Guid,
    pub title: String,
    pub link: String,
    pub description: String,
    pub author: String,
    #[serde(rename = "pubDate")]
    pub pub_date: DateTime<Utc>,
    pub tags: Vec<String>,
}

impl Item {
    /// Builds an item, rejecting an empty `title`, `link`, or `guid`.
    pub fn new(
        guid: Guid,
        title: impl Into<String>,
        link: impl Into<String>,
        description: impl Into<String>,
        author: impl Into<String>,
        pub_date: DateTime<Utc>,
    ) -> Result<Self, FieldError> {
        let title = title.into();
        let link = link.into();
        if title.is_empty() || link.is_empty() || guid.is_empty() {
            return Err(FieldError::EmptyItemField);
        }

        Ok(Item {
            guid,
            title,
            link,
            description: description.into(),
            author: author.into(),
            pub_date,
            tags: Vec::new(),
        })
    }

    /// Appends a tag unless it is already present. Insertion order is kept.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.tags.iter().any(|t| *t == tag) {
            self.tags.push(tag);
        }
    }
}
