//! Fingerprint and record storage.
//!
//! [`SyncStore`] is the storage seam of the sync engine; [`SqliteStore`] is
//! the production implementation on top of `sqlx`. An item's records and
//! its fingerprint are written in a single transaction, records first and
//! fingerprint last, so a fingerprint never claims content that was not
//! durably written.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::migrate;
use crate::models::{Fingerprint, PersistedRecord, SyncReport, SyncRun};

#[async_trait]
pub trait SyncStore: Send + Sync {
    /// All fingerprints of a source, keyed by source id.
    async fn load_fingerprints(&self, source: &str) -> Result<HashMap<String, Fingerprint>>;

    /// Upsert an item's records, drop chunk indices beyond the new set, and
    /// commit the item's fingerprint. All or nothing.
    async fn persist_item(&self, records: &[PersistedRecord], fingerprint: &Fingerprint)
        -> Result<()>;

    /// Append a row to the run history.
    async fn record_run(&self, run: &SyncRun, report: &SyncReport) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> AnyResult<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn fingerprint(&self, source: &str, source_id: &str) -> Result<Option<Fingerprint>> {
        let row = sqlx::query(
            "SELECT source, source_id, marker, sub_count, content_hash, chunk_count, synced_at
             FROM fingerprints WHERE source = ? AND source_id = ?",
        )
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| fingerprint_from_row(&r)))
    }

    /// Records of one item, ordered by chunk index.
    pub async fn records(&self, source: &str, source_id: &str) -> Result<Vec<PersistedRecord>> {
        let rows = sqlx::query(
            "SELECT source, source_id, chunk_index, title, url, text, hash, embedding, embedding_model
             FROM records WHERE source = ? AND source_id = ? ORDER BY chunk_index",
        )
        .bind(source)
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let blob: Option<Vec<u8>> = r.get("embedding");
                PersistedRecord {
                    source: r.get("source"),
                    source_id: r.get("source_id"),
                    chunk_index: r.get("chunk_index"),
                    title: r.get("title"),
                    url: r.get("url"),
                    text: r.get("text"),
                    hash: r.get("hash"),
                    embedding: blob.as_deref().map(blob_to_vec),
                    embedding_model: r.get("embedding_model"),
                }
            })
            .collect())
    }

    /// Delete every fingerprint of a source so the next sync reprocesses
    /// all items. Records are kept and get overwritten in place.
    pub async fn reset(&self, source: &str) -> Result<u64> {
        let done = sqlx::query("DELETE FROM fingerprints WHERE source = ?")
            .bind(source)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }

    /// Most recent runs first.
    pub async fn recent_runs(&self, source: &str, limit: i64) -> Result<Vec<SyncRun>> {
        let rows = sqlx::query(
            "SELECT id, source, started_at, finished_at, status, processed, skipped, failed, error
             FROM sync_runs WHERE source = ? ORDER BY started_at DESC, rowid DESC LIMIT ?",
        )
        .bind(source)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| SyncRun {
                id: r.get("id"),
                source: r.get("source"),
                started_at: from_ts(r.get("started_at")),
                finished_at: from_ts(r.get("finished_at")),
                status: r.get("status"),
                processed: r.get("processed"),
                skipped: r.get("skipped"),
                failed: r.get("failed"),
                error: r.get("error"),
            })
            .collect())
    }
}

fn from_ts(ts: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn fingerprint_from_row(r: &sqlx::sqlite::SqliteRow) -> Fingerprint {
    Fingerprint {
        source: r.get("source"),
        source_id: r.get("source_id"),
        marker: r.get("marker"),
        sub_count: r.get("sub_count"),
        content_hash: r.get("content_hash"),
        chunk_count: r.get("chunk_count"),
        synced_at: r.get("synced_at"),
    }
}

#[async_trait]
impl SyncStore for SqliteStore {
    async fn load_fingerprints(&self, source: &str) -> Result<HashMap<String, Fingerprint>> {
        let rows = sqlx::query(
            "SELECT source, source_id, marker, sub_count, content_hash, chunk_count, synced_at
             FROM fingerprints WHERE source = ?",
        )
        .bind(source)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(fingerprint_from_row)
            .map(|fp| (fp.source_id.clone(), fp))
            .collect())
    }

    async fn persist_item(
        &self,
        records: &[PersistedRecord],
        fingerprint: &Fingerprint,
    ) -> Result<()> {
        debug_assert!(records
            .iter()
            .all(|r| r.source == fingerprint.source && r.source_id == fingerprint.source_id));

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let blob = record.embedding.as_deref().map(vec_to_blob);
            let dims = record.embedding.as_ref().map(|v| v.len() as i64);
            sqlx::query(
                r#"
                INSERT INTO records (source, source_id, chunk_index, title, url, text, hash, embedding, embedding_model, dims, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(source, source_id, chunk_index) DO UPDATE SET
                    title = excluded.title,
                    url = excluded.url,
                    text = excluded.text,
                    hash = excluded.hash,
                    embedding = excluded.embedding,
                    embedding_model = excluded.embedding_model,
                    dims = excluded.dims,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&record.source)
            .bind(&record.source_id)
            .bind(record.chunk_index)
            .bind(&record.title)
            .bind(&record.url)
            .bind(&record.text)
            .bind(&record.hash)
            .bind(blob)
            .bind(&record.embedding_model)
            .bind(dims)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Content shrank: drop chunks past the new end
        sqlx::query("DELETE FROM records WHERE source = ? AND source_id = ? AND chunk_index >= ?")
            .bind(&fingerprint.source)
            .bind(&fingerprint.source_id)
            .bind(records.len() as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO fingerprints (source, source_id, marker, sub_count, content_hash, chunk_count, synced_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, source_id) DO UPDATE SET
                marker = excluded.marker,
                sub_count = excluded.sub_count,
                content_hash = excluded.content_hash,
                chunk_count = excluded.chunk_count,
                synced_at = excluded.synced_at
            "#,
        )
        .bind(&fingerprint.source)
        .bind(&fingerprint.source_id)
        .bind(fingerprint.marker)
        .bind(fingerprint.sub_count)
        .bind(&fingerprint.content_hash)
        .bind(fingerprint.chunk_count)
        .bind(fingerprint.synced_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_run(&self, run: &SyncRun, report: &SyncReport) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (id, source, started_at, finished_at, status, pages, listed, processed, skipped, failed, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.source)
        .bind(run.started_at.timestamp())
        .bind(run.finished_at.timestamp())
        .bind(&run.status)
        .bind(report.pages as i64)
        .bind(report.listed as i64)
        .bind(run.processed)
        .bind(run.skipped)
        .bind(run.failed)
        .bind(&run.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
