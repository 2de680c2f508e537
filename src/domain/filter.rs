use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use super::item::Item;

/// Include/exclude keyword gate applied when items are added to a feed.
///
/// Both lists hold regex patterns matched case-insensitively against an
/// item's title and description. An item is admitted when at least one
/// include pattern matches (or the include list is empty) and no exclude
/// pattern matches. Patterns that fail to compile are skipped, never fatal.
///
/// Equality is derived and order-sensitive; reordering a keyword list
/// counts as a configuration change and triggers a re-save upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFilter {
    pub include_keywords: Vec<String>,
    pub exclude_keywords: Vec<String>,
}

impl ItemFilter {
    pub fn new(include_keywords: Vec<String>, exclude_keywords: Vec<String>) -> Self {
        ItemFilter {
            include_keywords,
            exclude_keywords,
        }
    }

    pub fn is_match(&self, item: &Item) -> bool {
        if !self.include_keywords.is_empty() && !any_pattern_matches(&self.include_keywords, item)
        {
            return false;
        }

        if !self.exclude_keywords.is_empty() && any_pattern_matches(&self.exclude_keywords, item) {
            return false;
        }

        true
    }
}

fn any_pattern_matches(patterns: &[String], item: &Item) -> bool {
    patterns.iter().any(|pattern| {
        match RegexBuilder::new(pattern).case_insensitive(true).build() {
            Ok(re) => re.is_match(&item.title) || re.is_match(&item.description),
            Err(_) => false,
        }
    })
}
