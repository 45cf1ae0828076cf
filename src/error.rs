//! Typed error taxonomy for the sync pipeline.
//!
//! Each variant carries its own propagation scope. The batch driver in
//! [`crate::ingest`] uses [`SyncError::is_batch_fatal`] on listing errors
//! and [`SyncError::is_item_skip`] on per-item errors to decide whether to
//! stop the run, skip the item, or count it as failed.
//!
//! | Variant | Typical cause | Item-level effect |
//! |---------|---------------|-------------------|
//! | [`TransientFetch`](SyncError::TransientFetch) | network, 429, 5xx after retries | item failed |
//! | [`FatalFetch`](SyncError::FatalFetch) | 401/403, other 4xx | batch aborted |
//! | [`NotFound`](SyncError::NotFound) | 404/410 on detail | item skipped |
//! | [`Schema`](SyncError::Schema) | missing/mistyped response field | item failed |
//! | [`Embedding`](SyncError::Embedding) | embedding call failed | item failed |
//! | [`Persistence`](SyncError::Persistence) | database write failed | item failed |

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network failure, rate limit or server error. Retried with backoff
    /// inside the source; surfaces only once the attempts are exhausted.
    #[error("transient fetch error for {url}: {message}")]
    TransientFetch { url: String, message: String },

    /// Authentication, permission or other non-retryable client error.
    #[error("fatal fetch error for {url} (HTTP {status}): {message}")]
    FatalFetch {
        url: String,
        status: u16,
        message: String,
    },

    #[error("remote item not found: {0}")]
    NotFound(String),

    #[error("unexpected response schema from {url}: {message}")]
    Schema { url: String, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl SyncError {
    /// Errors that stop the whole batch no matter where they occur.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, SyncError::FatalFetch { .. })
    }

    /// Errors that skip an item without counting it as a failure.
    pub fn is_item_skip(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    /// Short label used in logs and run history.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::TransientFetch { .. } => "transient_fetch",
            SyncError::FatalFetch { .. } => "fatal_fetch",
            SyncError::NotFound(_) => "not_found",
            SyncError::Schema { .. } => "schema",
            SyncError::Embedding(_) => "embedding",
            SyncError::Persistence(_) => "persistence",
        }
    }
}
