//! Progress reporting and run control for long runs.
//!
//! Long indexing runs report observable progress so the host can show what
//! is being chunked and embedded and how much is left. Progress goes to
//! **stderr** (or wherever a host-supplied reporter sends it) so stdout
//! remains parseable.
//!
//! The same runs are cancellable through a shared [`CancelToken`], polled
//! between items and before every embedding call.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation token. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single progress event for an indexing run.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Documents are being chunked: n items processed out of total.
    Chunking { n: u64, total: u64 },
    /// Chunks are being embedded: n chunks processed out of total.
    Embedding { n: u64, total: u64 },
    /// A batch of items was committed to the store.
    Committed { items: u64 },
}

/// Reports indexing progress. Implementations must tolerate being called
/// from the middle of a batch loop.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "indexing  embedding  120 / 512 chunks".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Chunking { n, total } => {
                format!(
                    "indexing  chunking  {} / {} items\n",
                    format_number(*n),
                    format_number(*total)
                )
            }
            ProgressEvent::Embedding { n, total } => {
                format!(
                    "indexing  embedding  {} / {} chunks\n",
                    format_number(*n),
                    format_number(*total)
                )
            }
            ProgressEvent::Committed { items } => {
                format!("indexing  committed  {} items\n", format_number(*items))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Chunking { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "chunking",
                "n": n,
                "total": total
            }),
            ProgressEvent::Embedding { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "embedding",
                "n": n,
                "total": total
            }),
            ProgressEvent::Committed { items } => serde_json::json!({
                "event": "progress",
                "phase": "committed",
                "items": items
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}
