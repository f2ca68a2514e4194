//! Runtime counters for the bot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Statistics for the bot.
#[derive(Debug)]
pub struct RuntimeStats {
    /// Poll cycles that published a snapshot.
    pub polls_succeeded: AtomicU64,
    /// Poll cycles that failed to fetch prices.
    pub polls_failed: AtomicU64,
    /// Dispatch cycles that ran against a snapshot.
    pub dispatch_cycles: AtomicU64,
    /// Dispatch cycles that failed to query subscriptions.
    pub dispatch_errors: AtomicU64,
    /// Alerts delivered.
    pub alerts_sent: AtomicU64,
    /// Alerts that could not be delivered.
    pub alerts_failed: AtomicU64,
    started_at: Instant,
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeStats {
    pub fn new() -> Self {
        Self {
            polls_succeeded: AtomicU64::new(0),
            polls_failed: AtomicU64::new(0),
            dispatch_cycles: AtomicU64::new(0),
            dispatch_errors: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn record_poll(&self, ok: bool) {
        let counter = if ok {
            &self.polls_succeeded
        } else {
            &self.polls_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch(&self, delivered: usize, failed: usize) {
        self.dispatch_cycles.fetch_add(1, Ordering::Relaxed);
        self.alerts_sent.fetch_add(delivered as u64, Ordering::Relaxed);
        self.alerts_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn record_dispatch_error(&self) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            polls_succeeded: self.polls_succeeded.load(Ordering::Relaxed),
            polls_failed: self.polls_failed.load(Ordering::Relaxed),
            dispatch_cycles: self.dispatch_cycles.load(Ordering::Relaxed),
            dispatch_errors: self.dispatch_errors.load(Ordering::Relaxed),
            alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed: self.alerts_failed.load(Ordering::Relaxed),
            uptime_secs: self.uptime_secs(),
        }
    }
}

/// Summary of statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSummary {
    pub polls_succeeded: u64,
    pub polls_failed: u64,
    pub dispatch_cycles: u64,
    pub dispatch_errors: u64,
    pub alerts_sent: u64,
    pub alerts_failed: u64,
    pub uptime_secs: u64,
}
