//! Throttled progress reporting
//!
//! Worker pools share one [`ProgressTracker`] per phase. Counters live in a
//! small mutex-guarded struct; the lock only covers the increment and the
//! throttle check, and reporting happens after it is released.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;

/// Render a byte count with two decimals, e.g. `1.50 MB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut idx = 0;
    while value >= 1024.0 && idx < UNITS.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }
    format!("{value:.2} {}", UNITS[idx])
}

/// Point-in-time view of a phase's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub phase: &'static str,
    pub done_items: u64,
    pub total_items: u64,
    pub done_bytes: u64,
    pub total_bytes: u64,
    /// Set on the forced report after the pool drains
    pub finished: bool,
}

impl ProgressSnapshot {
    /// Byte-based completion percentage, clamped to 100 and forced to 100
    /// on the final report
    pub fn byte_percent(&self) -> f64 {
        if self.finished {
            return 100.0;
        }
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.done_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }
}

/// Destination for progress reports
pub trait ProgressSink: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);
}

/// Reports progress as `info!` lines: items processed and bytes hashed
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, s: &ProgressSnapshot) {
        info!(
            phase = s.phase,
            "Progress: {}/{} ({})",
            s.done_items,
            s.total_items,
            format_size(s.done_bytes)
        );
    }
}

/// Rewrites a single terminal line in place with byte-based progress
///
/// Each report starts with `\r` and is padded so that a shorter line fully
/// covers the previous one. The final report ends the line.
pub struct InlineProgress<W: Write + Send> {
    out: Mutex<InlineState<W>>,
}

struct InlineState<W> {
    writer: W,
    last_len: usize,
}

impl InlineProgress<std::io::Stderr> {
    /// Inline progress on stderr
    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }
}

impl<W: Write + Send> InlineProgress<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: Mutex::new(InlineState {
                writer,
                last_len: 0,
            }),
        }
    }

    /// Consume the sink and return the underlying writer
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(state) => state.writer,
            Err(poisoned) => poisoned.into_inner().writer,
        }
    }
}

impl<W: Write + Send> ProgressSink for InlineProgress<W> {
    fn report(&self, s: &ProgressSnapshot) {
        let msg = format!(
            "[{}] Progress: {:.0}% ({} / {})",
            s.phase,
            s.byte_percent(),
            format_size(s.done_bytes),
            format_size(s.total_bytes)
        );

        let Ok(mut state) = self.out.lock() else {
            return;
        };
        let pad = state.last_len.saturating_sub(msg.len());
        let mut line = format!("\r{msg}{}", " ".repeat(pad));
        if s.finished {
            line.push('\n');
            state.last_len = 0;
        } else {
            state.last_len = msg.len();
        }

        // Progress output is cosmetic; a closed terminal must not fail the run.
        if state.writer.write_all(line.as_bytes()).is_err() {
            info!("{msg}");
        }
        let _ = state.writer.flush();
    }
}

#[derive(Debug)]
struct Counters {
    done_items: u64,
    total_items: u64,
    done_bytes: u64,
    total_bytes: u64,
    last_emit: Instant,
}

/// Shared progress counters for one phase of a run
pub struct ProgressTracker {
    phase: &'static str,
    interval: Duration,
    sink: Arc<dyn ProgressSink>,
    counters: Mutex<Counters>,
}

impl ProgressTracker {
    pub fn new(phase: &'static str, interval: Duration, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            phase,
            interval,
            sink,
            counters: Mutex::new(Counters {
                done_items: 0,
                total_items: 0,
                done_bytes: 0,
                total_bytes: 0,
                last_emit: Instant::now(),
            }),
        }
    }

    /// Start a new batch with the given denominators
    pub fn reset(&self, total_items: u64, total_bytes: u64) {
        if let Ok(mut c) = self.counters.lock() {
            *c = Counters {
                done_items: 0,
                total_items,
                done_bytes: 0,
                total_bytes,
                last_emit: Instant::now(),
            };
        }
    }

    /// Record completed work; reports at most once per interval
    pub fn advance(&self, items: u64, bytes: u64) {
        let due = {
            let Ok(mut c) = self.counters.lock() else {
                return;
            };
            c.done_items += items;
            c.done_bytes += bytes;
            let now = Instant::now();
            if now.duration_since(c.last_emit) >= self.interval {
                c.last_emit = now;
                Some(self.snapshot_of(&c, false))
            } else {
                None
            }
        };

        if let Some(snapshot) = due {
            self.sink.report(&snapshot);
        }
    }

    /// Emit the forced final report for the batch
    ///
    /// Nothing is reported for an empty batch.
    pub fn finish(&self) {
        let snapshot = {
            let Ok(mut c) = self.counters.lock() else {
                return;
            };
            if c.total_items == 0 {
                return;
            }
            c.last_emit = Instant::now();
            self.snapshot_of(&c, true)
        };
        self.sink.report(&snapshot);
    }

    /// Current counters
    pub fn snapshot(&self) -> ProgressSnapshot {
        match self.counters.lock() {
            Ok(c) => self.snapshot_of(&c, false),
            Err(poisoned) => self.snapshot_of(&poisoned.into_inner(), false),
        }
    }

    fn snapshot_of(&self, c: &Counters, finished: bool) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase,
            done_items: c.done_items,
            total_items: c.total_items,
            done_bytes: c.done_bytes,
            total_bytes: c.total_bytes,
            finished,
        }
    }
}
