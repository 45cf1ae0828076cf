//! Batch sync orchestration.
//!
//! Coordinates one pass over the remote listing: list page → classify each
//! item against its fingerprint → fetch only New/Changed items → chunk,
//! embed and persist. Items are handled one at a time, in listing order.
//!
//! Error policy, per [`SyncError`]:
//! - `NotFound` on an item: skipped, batch continues;
//! - `FatalFetch` anywhere: batch stops;
//! - any other error on an item: counted as failed, batch continues;
//! - any error on a listing page or while loading fingerprints: batch stops.
//!
//! A stopped or cancelled batch still produces a [`SyncReport`] and a
//! `sync_runs` row, so the operator can decide whether to re-run.

use anyhow::Result as AnyResult;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::connector_forum::ForumSource;
use crate::detect::classify;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::SyncError;
use crate::models::{Classification, SyncReport, SyncRun};
use crate::persist::Persister;
use crate::progress::{NoProgress, ProgressMode, SyncProgressEvent, SyncProgressReporter};
use crate::source::RemoteSource;
use crate::store::{SqliteStore, SyncStore};

/// Per-run switches, usually from the CLI.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Treat every listed item as changed.
    pub full: bool,
    /// List and classify only; no fetches, no writes.
    pub dry_run: bool,
    /// Stop after considering this many listed items.
    pub limit: Option<usize>,
    /// Stop after this many listing pages.
    pub max_pages: Option<u32>,
}

/// Report of one batch, plus the error that stopped it, if any.
#[derive(Debug)]
pub struct BatchOutcome {
    pub report: SyncReport,
    pub abort: Option<SyncError>,
}

impl BatchOutcome {
    pub fn status(&self) -> &'static str {
        if self.abort.is_some() {
            "aborted"
        } else if self.report.cancelled {
            "cancelled"
        } else if self.report.failed > 0 {
            "partial"
        } else {
            "ok"
        }
    }
}

pub struct SyncEngine<'a> {
    source: &'a dyn RemoteSource,
    store: &'a dyn SyncStore,
    embedder: &'a dyn EmbeddingProvider,
    max_tokens: usize,
    embed_batch_size: usize,
    progress: &'a dyn SyncProgressReporter,
    cancel: Arc<AtomicBool>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        source: &'a dyn RemoteSource,
        store: &'a dyn SyncStore,
        embedder: &'a dyn EmbeddingProvider,
        max_tokens: usize,
        embed_batch_size: usize,
    ) -> Self {
        Self {
            source,
            store,
            embedder,
            max_tokens,
            embed_batch_size,
            progress: &NoProgress,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn SyncProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Share a flag that stops the batch before the next item when set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Run one batch and record it in the run history (unless dry-run).
    pub async fn run(&self, options: &SyncOptions) -> BatchOutcome {
        let started_at = Utc::now();
        let outcome = self.run_batch(options).await;

        if !options.dry_run {
            let run = SyncRun {
                id: Uuid::new_v4().to_string(),
                source: self.source.name().to_string(),
                started_at,
                finished_at: Utc::now(),
                status: outcome.status().to_string(),
                processed: outcome.report.processed as i64,
                skipped: outcome.report.skipped as i64,
                failed: outcome.report.failed as i64,
                error: outcome.abort.as_ref().map(|e| e.to_string()),
            };
            if let Err(e) = self.store.record_run(&run, &outcome.report).await {
                warn!("failed to record sync run: {}", e);
            }
        }

        outcome
    }

    async fn run_batch(&self, options: &SyncOptions) -> BatchOutcome {
        let source_name = self.source.name().to_string();
        let mut report = SyncReport::default();

        let mut fingerprints = match self.store.load_fingerprints(&source_name).await {
            Ok(fps) => fps,
            Err(e) => {
                error!("cannot load fingerprints: {}", e);
                return BatchOutcome {
                    report,
                    abort: Some(e),
                };
            }
        };

        let persister = Persister::new(
            &source_name,
            self.store,
            self.embedder,
            self.max_tokens,
            self.embed_batch_size,
        );
        let mut seen: HashSet<String> = HashSet::new();
        let mut page: u32 = 0;

        'pages: loop {
            if options.max_pages.is_some_and(|max| page >= max) {
                break;
            }
            if self.cancelled() {
                report.cancelled = true;
                break;
            }

            let listing = match self.source.list_page(page).await {
                Ok(listing) => listing,
                Err(e) => {
                    error!(page, "listing failed: {}", e);
                    return BatchOutcome {
                        report,
                        abort: Some(e),
                    };
                }
            };
            report.pages += 1;
            self.progress.report(SyncProgressEvent::Listing {
                source: source_name.clone(),
                page,
                items: listing.items.len(),
            });

            for item in &listing.items {
                if options.limit.is_some_and(|lim| report.listed as usize >= lim) {
                    break 'pages;
                }
                if self.cancelled() {
                    report.cancelled = true;
                    break 'pages;
                }
                // Listings can shift while paging; handle each id once per run
                if !seen.insert(item.source_id.clone()) {
                    continue;
                }
                report.listed += 1;

                let previous = fingerprints.get(&item.source_id);
                let class = match classify(item, previous) {
                    Classification::Unchanged if options.full => Classification::Changed,
                    c => c,
                };

                match class {
                    Classification::New => report.new += 1,
                    Classification::Changed => report.changed += 1,
                    Classification::Unchanged => report.skipped += 1,
                }

                if class.needs_fetch() && !options.dry_run {
                    report.fetches += 1;
                    let result = match self.source.fetch_item(&item.source_id).await {
                        Ok(content) => persister.persist(item, &content).await,
                        Err(e) => Err(e),
                    };

                    match result {
                        Ok(outcome) => {
                            info!(
                                source_id = %item.source_id,
                                class = class.as_str(),
                                chunks = outcome.chunks,
                                "synced"
                            );
                            report.processed += 1;
                            report.chunks_written += outcome.chunks as u64;
                            fingerprints.insert(item.source_id.clone(), outcome.fingerprint);
                        }
                        Err(e) if e.is_item_skip() => {
                            warn!(source_id = %item.source_id, "item vanished, skipping: {}", e);
                            report.not_found += 1;
                            report.skipped += 1;
                        }
                        Err(e) if e.is_batch_fatal() => {
                            error!(source_id = %item.source_id, "aborting batch: {}", e);
                            return BatchOutcome {
                                report,
                                abort: Some(e),
                            };
                        }
                        Err(e) => {
                            warn!(
                                source_id = %item.source_id,
                                kind = e.kind(),
                                "item failed, will retry next run: {}",
                                e
                            );
                            report.failed += 1;
                        }
                    }
                }

                self.progress.report(SyncProgressEvent::Processing {
                    source: source_name.clone(),
                    n: report.processed + report.skipped + report.failed,
                    listed: report.listed,
                });
            }

            if !listing.has_more || listing.items.is_empty() {
                break;
            }
            page += 1;
        }

        BatchOutcome {
            report,
            abort: None,
        }
    }
}

/// `csync sync`: build the production components from config and run one
/// batch, printing the summary report.
pub async fn run_sync(
    config: &Config,
    options: &SyncOptions,
    progress: ProgressMode,
    cancel: Arc<AtomicBool>,
) -> AnyResult<SyncReport> {
    let store = SqliteStore::open(config).await?;
    let source = ForumSource::from_config(config)?;
    let embedder = embedding::create_provider(&config.embedding)?;
    let reporter = progress.reporter();

    let options = SyncOptions {
        max_pages: options.max_pages.or(config.source.max_pages),
        ..options.clone()
    };

    let engine = SyncEngine::new(
        &source,
        &store,
        embedder.as_ref(),
        config.chunking.max_tokens,
        config.embedding.batch_size,
    )
    .with_progress(reporter.as_ref())
    .with_cancel_flag(cancel);

    let outcome = engine.run(&options).await;
    print_report(source.name(), &options, &outcome);
    store.close().await;

    match outcome.abort {
        Some(e) => Err(anyhow::Error::new(e).context("sync aborted")),
        None => Ok(outcome.report),
    }
}

fn print_report(source: &str, options: &SyncOptions, outcome: &BatchOutcome) {
    let r = &outcome.report;
    if options.dry_run {
        println!("sync {} (dry-run)", source);
    } else {
        println!("sync {}", source);
    }
    println!("  pages: {}", r.pages);
    println!("  listed: {} (new {}, changed {})", r.listed, r.new, r.changed);
    println!("  processed: {}", r.processed);
    println!("  skipped: {}", r.skipped);
    println!("  failed: {}", r.failed);
    if r.not_found > 0 {
        println!("  not found: {}", r.not_found);
    }
    if !options.dry_run {
        println!("  chunks written: {}", r.chunks_written);
    }
    if let Some(e) = &outcome.abort {
        println!("  aborted: {}", e);
    }
    println!("{}", outcome.status());
}
