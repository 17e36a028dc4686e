//! Global atomic counters for regkit observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a command).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters, flushed once per command.
pub struct Metrics {
    sources_inlined: AtomicU64,
    source_faults: AtomicU64,
    submissions: AtomicU64,
    submissions_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sources_inlined: AtomicU64::new(0),
            source_faults: AtomicU64::new(0),
            submissions: AtomicU64::new(0),
            submissions_failed: AtomicU64::new(0),
        }
    }

    /// Increment the sources-inlined counter by one.
    pub fn inc_sources_inlined(&self) {
        self.sources_inlined.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "sources_inlined", "counter incremented");
    }

    /// Increment the source-faults counter by one.
    pub fn inc_faults(&self) {
        self.source_faults.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "source_faults", "counter incremented");
    }

    /// Record one finished verification submission.
    pub fn inc_submissions(&self, failed: bool) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.submissions_failed.fetch_add(1, Ordering::Relaxed);
        }
        tracing::trace!(metric = "submissions", failed, "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            sources_inlined = self.sources_inlined(),
            source_faults = self.source_faults(),
            submissions = self.submissions(),
            submissions_failed = self.submissions_failed(),
        );
    }

    pub fn sources_inlined(&self) -> u64 {
        self.sources_inlined.load(Ordering::Relaxed)
    }

    pub fn source_faults(&self) -> u64 {
        self.source_faults.load(Ordering::Relaxed)
    }

    pub fn submissions(&self) -> u64 {
        self.submissions.load(Ordering::Relaxed)
    }

    pub fn submissions_failed(&self) -> u64 {
        self.submissions_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.sources_inlined.store(0, Ordering::Relaxed);
        self.source_faults.store(0, Ordering::Relaxed);
        self.submissions.store(0, Ordering::Relaxed);
        self.submissions_failed.store(0, Ordering::Relaxed);
    }
}
