//! # content-sync
//!
//! Change-aware content synchronisation from a paginated remote source into
//! SQLite, with optional chunk embeddings.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Remote       │──▶│ Change       │──▶│ Item         │──▶│ Chunk+Embed  │
//! │ Lister       │   │ Detector     │   │ Fetcher      │   │ +Persist     │
//! └──────────────┘   └──────┬───────┘   └──────────────┘   └──────┬───────┘
//!                           │                                     │
//!                           ▼                                     ▼
//!                    ┌──────────────────────────────────────────────────┐
//!                    │   SQLite: fingerprints · records · sync_runs     │
//!                    └──────────────────────────────────────────────────┘
//! ```
//!
//! Only summary fields are compared against stored fingerprints, so an
//! unchanged item costs one listing row and no further requests.
//!
//! ## Quick Start
//!
//! ```bash
//! csync init                 # create database
//! csync sync --dry-run       # list and classify only
//! csync sync                 # fetch, chunk, embed, persist what changed
//! csync status               # counts and recent runs
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Sync error taxonomy |
//! | [`source`] | Remote source trait (lister + fetcher) |
//! | [`connector_forum`] | Discourse-compatible forum source |
//! | [`retry`] | Bounded exponential backoff |
//! | [`detect`] | New / Changed / Unchanged classification |
//! | [`chunk`] | Paragraph-boundary chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`persist`] | Chunk, embed and persist one item |
//! | [`store`] | Fingerprint and record storage |
//! | [`ingest`] | Batch driver |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod connector_forum;
pub mod db;
pub mod detect;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod persist;
pub mod progress;
pub mod retry;
pub mod source;
pub mod stats;
pub mod store;
