//! Validation errors for the domain model.

/// Errors raised when a value does not fit the domain model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// A laureate share outside the `1..=4` range.
    #[error("share must be between 1 and 4, got {0}")]
    InvalidShare(u8),

    /// A category name that is not one of the Nobel prize categories.
    #[error("unknown prize category: {0:?}")]
    UnknownCategory(String),

    /// Optional text that was empty or whitespace only.
    #[error("text must not be blank")]
    BlankText,

    /// A numeric field that arrived as text and could not be parsed.
    #[error("invalid {field}: {value:?} is not a number")]
    InvalidNumber {
        /// Name of the offending field.
        field: &'static str,
        /// The raw text that failed to parse.
        value: String,
    },
}
