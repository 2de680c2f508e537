use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::actor::Actor;
use super::error::FieldError;
use super::filter::ItemFilter;
use super::item::{Guid, Item};

/// The aggregate for one subscribed source and its items.
///
/// `source` (the feed URL's host) is the natural key used for every lookup;
/// `id` is assigned once at creation and never changes across updates — a
/// feed is re-identified by source, not id. Items are owned strictly by
/// containment and keyed by [`Guid`]; inserting an item re-applies the
/// feed's [`ItemFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub source: String,
    pub title: String,
    pub link: String,
    pub description: String,
    pub language: String,
    pub last_build_date: DateTime<Utc>,
    pub items: HashMap<Guid, Item>,
    pub item_filter: ItemFilter,
    #[serde(rename = "create_by", default)]
    pub created_by: Actor,
    #[serde(rename = "create_at", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "update_by", default)]
    pub updated_by: Actor,
    #[serde(rename = "update_at", default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Feed {
    /// Builds a feed with a fresh id, an empty filter, and no items.
    ///
    /// `title`, `source`, and `link` must be non-empty and a last build
    /// date must be present; audit fields stay unset until the first save.
    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        link: impl Into<String>,
        description: impl Into<String>,
        language: impl Into<String>,
        last_build_date: Option<DateTime<Utc>>,
    ) -> Result<Self, FieldError> {
        let title = title.into();
        let source = source.into();
        let link = link.into();
        if title.is_empty() || source.is_empty() || link.is_empty() {
            return Err(FieldError::EmptyFeedField);
        }
        let last_build_date = last_build_date.ok_or(FieldError::MissingLastBuildDate)?;

        Ok(Feed {
            id: Uuid::new_v4(),
            source,
            title,
            link,
            description: description.into(),
            language: language.into(),
            last_build_date,
            items: HashMap::new(),
            item_filter: ItemFilter::default(),
            created_by: Actor::default(),
            created_at: None,
            updated_by: Actor::default(),
            updated_at: None,
        })
    }

    /// Overwrites the last build date; a missing date is rejected.
    pub fn set_last_build_date(
        &mut self,
        last_build_date: Option<DateTime<Utc>>,
    ) -> Result<(), FieldError> {
        self.last_build_date = last_build_date.ok_or(FieldError::MissingLastBuildDate)?;
        Ok(())
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    /// Inserts or overwrites an item by guid, last write wins.
    ///
    /// The item filter is re-evaluated on every insert: a non-matching item
    /// is dropped and any existing entry under the same guid is untouched.
    pub fn add_or_update_item(&mut self, item: Item) {
        if self.item_filter.is_match(&item) {
            self.items.insert(item.guid.clone(), item);
        }
    }

    /// Replaces the filter wholesale. Already-stored items are not
    /// re-filtered.
    pub fn set_item_filter(
        &mut self,
        include_keywords: Vec<String>,
        exclude_keywords: Vec<String>,
    ) {
        self.item_filter = ItemFilter::new(include_keywords, exclude_keywords);
    }
}
