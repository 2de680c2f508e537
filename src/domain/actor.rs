use serde::{Deserialize, Serialize};

/// Audit identity recorded on a feed's `created_by` / `updated_by` fields.
///
/// The pipeline stamps the feed's own source here when no human actor is
/// involved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Actor {
            id: id.into(),
            name: name.into(),
        }
    }

    /// An actor with no identity, the state before a feed's first save.
    pub fn is_unset(&self) -> bool {
        self.id.is_empty()
    }
}
