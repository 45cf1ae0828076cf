//! # content-sync CLI (`csync`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `csync init` | Create the SQLite database and run schema migrations |
//! | `csync sync` | Run one change-aware sync batch |
//! | `csync status` | Show counts and recent runs |
//! | `csync reset` | Forget all fingerprints so the next sync reprocesses everything |

use anyhow::bail;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use content_sync::config;
use content_sync::ingest::{self, SyncOptions};
use content_sync::migrate;
use content_sync::progress::ProgressMode;
use content_sync::stats;
use content_sync::store::SqliteStore;

/// content-sync: list a remote source, diff against stored fingerprints,
/// and fetch, chunk, embed and store only what changed.
#[derive(Parser)]
#[command(name = "csync", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, env = "CSYNC_CONFIG", default_value = "./config/csync.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Run one sync batch.
    ///
    /// Lists the remote source page by page, skips items whose marker and
    /// sub-element count match their fingerprint, and fetches, chunks,
    /// embeds and stores the rest.
    Sync {
        /// Ignore fingerprints and reprocess every listed item.
        #[arg(long)]
        full: bool,

        /// List and classify only; nothing is fetched or written.
        #[arg(long)]
        dry_run: bool,

        /// Maximum number of listed items to consider.
        #[arg(long)]
        limit: Option<usize>,

        /// Maximum number of listing pages (overrides `source.max_pages`).
        #[arg(long)]
        max_pages: Option<u32>,

        /// Progress output on stderr.
        #[arg(long, value_enum)]
        progress: Option<ProgressArg>,
    },

    /// Show item, record and embedding counts plus recent runs.
    Status {
        /// Number of recent runs to show.
        #[arg(long, default_value_t = 5)]
        runs: i64,
    },

    /// Delete all fingerprints for the configured source.
    Reset {
        /// Confirm the reset.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Sync {
            full,
            dry_run,
            limit,
            max_pages,
            progress,
        } => {
            let cancel = Arc::new(AtomicBool::new(false));
            let flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, stopping after the current item");
                    flag.store(true, Ordering::SeqCst);
                }
            });

            let options = SyncOptions {
                full,
                dry_run,
                limit,
                max_pages,
            };
            let mode = progress
                .map(ProgressMode::from)
                .unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_sync(&cfg, &options, mode, cancel).await?;
        }
        Commands::Status { runs } => {
            stats::run_status(&cfg, runs).await?;
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("reset forgets every fingerprint; pass --yes to confirm");
            }
            let store = SqliteStore::open(&cfg).await?;
            let removed = store.reset(&cfg.source.name).await?;
            store.close().await;
            println!("reset {}", cfg.source.name);
            println!("  fingerprints removed: {}", removed);
        }
    }

    Ok(())
}
