//! SQLite connection pool.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Open the configured database, creating the file and its directory if
/// needed. Uses WAL with a 5s busy timeout.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("cannot open database {}", db_path.display()))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    #[tokio::test]
    async fn test_connect_creates_nested_directory() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("a/b/csync.sqlite");
        let cfg = parse_config(&format!(
            "[db]\npath = \"{}\"\n[source]\nbase_url = \"https://forum.example.com\"\n[chunking]\nmax_tokens = 100\n",
            path.display()
        ))
        .unwrap();

        let pool = connect(&cfg).await.unwrap();
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert!(path.exists());
        pool.close().await;
    }
}
