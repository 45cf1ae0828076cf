//! Database statistics and run history.
//!
//! Backs `csync status`: how many items are fingerprinted, how many chunk
//! records and embeddings exist, and how the last few runs went.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::store::SqliteStore;

/// Counts for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub items: i64,
    pub records: i64,
    pub embedded: i64,
    pub last_synced_at: Option<i64>,
}

pub async fn source_stats(pool: &SqlitePool, source: &str) -> Result<SourceStats> {
    let (items, last_synced_at): (i64, Option<i64>) =
        sqlx::query_as("SELECT COUNT(*), MAX(synced_at) FROM fingerprints WHERE source = ?")
            .bind(source)
            .fetch_one(pool)
            .await?;

    let (records, embedded): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(embedding) FROM records WHERE source = ?",
    )
    .bind(source)
    .fetch_one(pool)
    .await?;

    Ok(SourceStats {
        items,
        records,
        embedded,
        last_synced_at,
    })
}

/// Run the status command: query the database and print a summary.
pub async fn run_status(config: &Config, runs: i64) -> Result<()> {
    let store = SqliteStore::open(config).await?;
    let source = &config.source.name;
    let stats = source_stats(store.pool(), source).await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("content-sync status");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Source:      {} ({})", source, config.source.base_url);
    println!();
    println!("  Items:       {}", stats.items);
    println!("  Records:     {}", stats.records);
    println!(
        "  Embedded:    {} / {} ({}%)",
        stats.embedded,
        stats.records,
        if stats.records > 0 {
            (stats.embedded * 100) / stats.records
        } else {
            0
        }
    );
    println!(
        "  Last item:   {}",
        stats
            .last_synced_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    let history = store.recent_runs(source, runs).await?;
    if !history.is_empty() {
        println!();
        println!("  Recent runs:");
        println!(
            "  {:<18} {:<10} {:>9} {:>8} {:>7}",
            "STARTED", "STATUS", "PROCESSED", "SKIPPED", "FAILED"
        );
        println!("  {}", "-".repeat(56));
        for run in &history {
            println!(
                "  {:<18} {:<10} {:>9} {:>8} {:>7}",
                format_ts_iso(run.started_at.timestamp()),
                run.status,
                run.processed,
                run.skipped,
                run.failed
            );
            if let Some(err) = &run.error {
                println!("    error: {}", err);
            }
        }
    }
    println!();

    store.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_relative_recent() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
    }
}
