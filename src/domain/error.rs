use thiserror::Error;

/// Aggregate invariant violations: a required field was empty or missing.
///
/// Raised by the `Feed` and `Item` constructors and setters; never retried,
/// always returned straight to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("item requires a non-empty title, link, and guid")]
    EmptyItemField,

    #[error("feed requires a non-empty title, source, and link")]
    EmptyFeedField,

    #[error("feed requires a last build date")]
    MissingLastBuildDate,
}
