//! Core data models used throughout the sync pipeline.
//!
//! These types represent the listing summaries, fingerprints, fetched
//! content and persisted chunk records that flow from the remote source
//! into storage.

use chrono::{DateTime, Utc};

/// Lightweight summary of a remote item, as returned by a listing page.
///
/// Immutable snapshot of remote state at listing time. Never carries the
/// item body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteItem {
    pub source_id: String,
    /// Change marker: Unix seconds of last activity (or any counter that
    /// only moves forward when the item changes).
    pub marker: i64,
    pub title: Option<String>,
    /// Number of sub-elements (e.g. posts in a topic).
    pub sub_count: i64,
}

/// One page of a remote listing.
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub items: Vec<RemoteItem>,
    pub has_more: bool,
}

/// Locally stored marker of an item's last-synced state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub source: String,
    pub source_id: String,
    pub marker: i64,
    pub sub_count: i64,
    /// SHA-256 hex of the body that was persisted.
    pub content_hash: String,
    pub chunk_count: i64,
    pub synced_at: i64,
}

/// Full content of a remote item, fetched only for New/Changed items.
#[derive(Debug, Clone)]
pub struct ItemContent {
    pub source_id: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub body: String,
}

/// A chunk of an item's body text.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Durable representation of one chunk of an item.
///
/// Keyed by `(source, source_id, chunk_index)`.
#[derive(Debug, Clone)]
pub struct PersistedRecord {
    pub source: String,
    pub source_id: String,
    pub chunk_index: i64,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: String,
    pub hash: String,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
}

/// Result of comparing a [`RemoteItem`] to its stored [`Fingerprint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Changed,
    Unchanged,
}

impl Classification {
    pub fn needs_fetch(self) -> bool {
        !matches!(self, Classification::Unchanged)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Classification::New => "new",
            Classification::Changed => "changed",
            Classification::Unchanged => "unchanged",
        }
    }
}

/// Summary of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub pages: u64,
    pub listed: u64,
    pub new: u64,
    pub changed: u64,
    /// Items persisted successfully.
    pub processed: u64,
    /// Unchanged items plus items that vanished remotely.
    pub skipped: u64,
    pub not_found: u64,
    pub failed: u64,
    pub fetches: u64,
    pub chunks_written: u64,
    pub cancelled: bool,
}

/// Row of the `sync_runs` history table.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: String,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: String,
    pub processed: i64,
    pub skipped: i64,
    pub failed: i64,
    pub error: Option<String>,
}
