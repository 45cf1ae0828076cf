//! Sync progress reporting.
//!
//! Progress is emitted on **stderr** so the summary on stdout stays
//! parseable for scripts. The engine calls the reporter once per listing
//! page and once per handled item.

use std::io::{IsTerminal, Write};

/// A single progress event for sync.
#[derive(Clone, Debug)]
pub enum SyncProgressEvent {
    /// A listing page was fetched.
    Listing {
        source: String,
        page: u32,
        items: usize,
    },
    /// `n` items handled out of `listed` seen so far.
    Processing {
        source: String,
        n: u64,
        listed: u64,
    },
}

/// Reports sync progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "sync forum  processing  1,234 / 5,000 items".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Listing {
                source,
                page,
                items,
            } => format!("sync {}  listing page {} ({} items)\n", source, page, items),
            SyncProgressEvent::Processing { source, n, listed } => format!(
                "sync {}  processing  {} / {} items\n",
                source,
                format_number(*n),
                format_number(*listed)
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Listing {
                source,
                page,
                items,
            } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "listing",
                "page": page,
                "items": items
            }),
            SyncProgressEvent::Processing { source, n, listed } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "processing",
                "n": n,
                "listed": listed
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if std::io::stderr().is_terminal() {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
