//! Byte counters and report throttling for one transfer phase.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::config::Config;

/// Shared byte counter, incremented by the stream that moves the bytes and
/// sampled by the reporter.
#[derive(Clone, Debug, Default)]
pub struct ProgressCounter(Arc<AtomicU64>);

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) -> u64 {
        self.0.fetch_add(n, Ordering::Relaxed) + n
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ProgressSettings {
    pub min_percent: f64,
    pub min_interval: Duration,
}

impl ProgressSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            min_percent: cfg.progress_min_percent,
            min_interval: cfg.progress_min_interval,
        }
    }
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            min_percent: 2.0,
            min_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressSnapshot {
    pub bytes: u64,
    pub total: Option<u64>,
    pub percent: Option<f64>,
    /// Bytes per second since the previous report.
    pub speed_bps: f64,
}

#[derive(Clone, Copy, Debug)]
struct LastReport {
    at: Instant,
    bytes: u64,
    percent: Option<f64>,
}

#[derive(Debug)]
pub struct ProgressTracker {
    total: Option<u64>,
    settings: ProgressSettings,
    started: Instant,
    bytes: u64,
    last: Option<LastReport>,
}

impl ProgressTracker {
    pub fn new(total: Option<u64>, settings: ProgressSettings, now: Instant) -> Self {
        Self {
            total,
            settings,
            started: now,
            bytes: 0,
            last: None,
        }
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Record the latest absolute byte count. Never moves backwards.
    pub fn record(&mut self, bytes: u64) {
        self.bytes = self.bytes.max(bytes);
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total? {
            0 => Some(100.0),
            total => Some((self.bytes as f64 * 100.0 / total as f64).min(100.0)),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total.is_some_and(|t| self.bytes >= t)
    }

    pub fn should_report(&self, now: Instant) -> bool {
        let Some(last) = self.last else {
            return true;
        };

        if self.is_complete() && last.bytes != self.bytes {
            return true;
        }

        if let (Some(p), Some(prev)) = (self.percent(), last.percent) {
            if p - prev >= self.settings.min_percent && p > prev {
                return true;
            }
        }

        now.saturating_duration_since(last.at) >= self.settings.min_interval
    }

    pub fn snapshot(&self, now: Instant) -> ProgressSnapshot {
        let (since, base) = match self.last {
            Some(last) => (last.at, last.bytes),
            None => (self.started, 0),
        };
        let secs = now.saturating_duration_since(since).as_secs_f64();
        let speed_bps = if secs > 0.0 {
            self.bytes.saturating_sub(base) as f64 / secs
        } else {
            0.0
        };

        ProgressSnapshot {
            bytes: self.bytes,
            total: self.total,
            percent: self.percent(),
            speed_bps,
        }
    }

    pub fn mark_reported(&mut self, now: Instant) {
        self.last = Some(LastReport {
            at: now,
            bytes: self.bytes,
            percent: self.percent(),
        });
    }
}
