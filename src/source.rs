//! Remote source abstraction.
//!
//! A [`RemoteSource`] is both the Remote Lister and the Item Fetcher of the
//! sync pipeline. The listing must stay lightweight: it returns summary
//! fields only, enough for [`crate::detect::classify`] to decide whether
//! the full item needs fetching.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use content_sync::error::{Result, SyncError};
//! use content_sync::models::{ItemContent, ListingPage};
//! use content_sync::source::RemoteSource;
//!
//! pub struct EmptySource;
//!
//! #[async_trait]
//! impl RemoteSource for EmptySource {
//!     fn name(&self) -> &str { "empty" }
//!
//!     async fn list_page(&self, _page: u32) -> Result<ListingPage> {
//!         Ok(ListingPage::default())
//!     }
//!
//!     async fn fetch_item(&self, source_id: &str) -> Result<ItemContent> {
//!         Err(SyncError::NotFound(source_id.to_string()))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ItemContent, ListingPage};

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Source label stored with every fingerprint and record.
    fn name(&self) -> &str;

    /// Fetch one page of summaries. Pages are numbered from 0.
    ///
    /// # Errors
    ///
    /// [`SyncError::TransientFetch`](crate::error::SyncError::TransientFetch)
    /// once retries are exhausted,
    /// [`SyncError::FatalFetch`](crate::error::SyncError::FatalFetch) on
    /// authentication or other client errors,
    /// [`SyncError::Schema`](crate::error::SyncError::Schema) when the body
    /// does not match the expected shape.
    async fn list_page(&self, page: u32) -> Result<ListingPage>;

    /// Fetch the full content of one item.
    ///
    /// Returns [`SyncError::NotFound`](crate::error::SyncError::NotFound)
    /// if the item disappeared after it was listed.
    async fn fetch_item(&self, source_id: &str) -> Result<ItemContent>;
}
