//! The feed aggregate: one subscribed source, its items, and the keyword
//! filter gating item insertion.
//!
//! Everything here is pure and synchronous; persistence and reconciliation
//! live in [`crate::store`] and [`crate::reconcile`].

mod actor;
mod error;
mod feed;
mod filter;
mod item;

pub use actor::Actor;
pub use error::FieldError;
pub use feed::Feed;
pub use filter::ItemFilter;
pub use item::{Guid, Item};
