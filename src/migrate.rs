use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per remote item that has been synced at least once
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fingerprints (
            source TEXT NOT NULL,
            source_id TEXT NOT NULL,
            marker INTEGER NOT NULL,
            sub_count INTEGER NOT NULL,
            content_hash TEXT NOT NULL,
            chunk_count INTEGER NOT NULL,
            synced_at INTEGER NOT NULL,
            UNIQUE(source, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per chunk of a synced item
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            source TEXT NOT NULL,
            source_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            title TEXT,
            url TEXT,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB,
            embedding_model TEXT,
            dims INTEGER,
            updated_at INTEGER NOT NULL,
            UNIQUE(source, source_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            started_at INTEGER NOT NULL,
            finished_at INTEGER NOT NULL,
            status TEXT NOT NULL,
            pages INTEGER NOT NULL,
            listed INTEGER NOT NULL,
            processed INTEGER NOT NULL,
            skipped INTEGER NOT NULL,
            failed INTEGER NOT NULL,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_source_item ON records(source, source_id)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_sync_runs_started_at ON sync_runs(started_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
