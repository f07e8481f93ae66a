//! Error types for loading the Nobel API feed.
//!
//! Uses `thiserror` for typed errors; the command layer wraps them in
//! `anyhow` with context before reporting.

use nobel_types::ModelError;

/// Errors that can occur while loading or converting a feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The HTTP request failed or returned a non-success status.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// A local dump file could not be read.
    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    /// The body was not a valid Nobel API response.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// A record decoded but could not be converted to the domain model.
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}
