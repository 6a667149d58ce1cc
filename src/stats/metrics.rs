//! Statistics and metrics for event fan-out

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Live counters updated by the broadcaster and keep-alive tasks
#[derive(Debug)]
pub struct BroadcastStats {
    started_at: Instant,
    events_published: AtomicU64,
    frames_delivered: AtomicU64,
    push_failures: AtomicU64,
    retries_scheduled: AtomicU64,
    retries_delivered: AtomicU64,
    events_dropped: AtomicU64,
    pings_sent: AtomicU64,
    connections_opened: AtomicU64,
}

impl BroadcastStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            events_published: AtomicU64::new(0),
            frames_delivered: AtomicU64::new(0),
            push_failures: AtomicU64::new(0),
            retries_scheduled: AtomicU64::new(0),
            retries_delivered: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            pings_sent: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_publish(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, frames: u64) {
        self.frames_delivered.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn record_push_failures(&self, failures: u64) {
        self.push_failures.fetch_add(failures, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_scheduled(&self) {
        self.retries_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_delivered(&self) {
        self.retries_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ping(&self) {
        self.pings_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// Time since the tracker was created
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Copy the current counter values
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            retries_scheduled: self.retries_scheduled.load(Ordering::Relaxed),
            retries_delivered: self.retries_delivered.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            pings_sent: self.pings_sent.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            uptime_secs: self.uptime().as_secs(),
        }
    }
}

impl Default for BroadcastStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`BroadcastStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStatsSnapshot {
    /// Calls to publish
    pub events_published: u64,
    /// Frames handed to subscriber channels (events and pings)
    pub frames_delivered: u64,
    /// Pushes that failed and removed a subscriber
    pub push_failures: u64,
    /// Publishes that found no subscriber and scheduled a re-check
    pub retries_scheduled: u64,
    /// Re-checks that found subscribers
    pub retries_delivered: u64,
    /// Events dropped after the re-check found nobody
    pub events_dropped: u64,
    /// Keep-alive pings pushed
    pub pings_sent: u64,
    /// Connections opened through the broadcaster
    pub connections_opened: u64,
    /// Seconds since startup
    pub uptime_secs: u64,
}
