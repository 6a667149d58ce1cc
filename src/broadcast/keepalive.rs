//! Per-connection keep-alive
//!
//! Pings keep idle connections open through proxies and are how a dead
//! client is noticed between real events.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::event::{encode, ChatEvent};
use crate::registry::{RoomRegistry, Subscriber};
use crate::stats::BroadcastStats;

/// Handle to a subscriber's ping task
///
/// The task is aborted when the handle is dropped, so a connection that owns
/// its `KeepAlive` can never leak a timer.
#[derive(Debug)]
pub struct KeepAlive {
    handle: JoinHandle<()>,
}

impl KeepAlive {
    /// Start pinging `subscriber` every `interval`
    ///
    /// The first ping goes out one full interval after this call. Must be
    /// called from within a Tokio runtime.
    pub fn spawn(
        registry: Arc<RoomRegistry>,
        subscriber: Arc<Subscriber>,
        interval: Duration,
        stats: Arc<BroadcastStats>,
    ) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(run(registry, subscriber, interval, stats));
        Self { handle }
    }

    /// Check whether the task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    registry: Arc<RoomRegistry>,
    subscriber: Arc<Subscriber>,
    interval: Duration,
    stats: Arc<BroadcastStats>,
) {
    let frame = match encode(&ChatEvent::ping()) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode ping frame");
            return;
        }
    };

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        if !subscriber.is_active() {
            tracing::debug!(
                room = %subscriber.room_id(),
                subscriber = subscriber.id(),
                "Subscriber inactive, keep-alive stopped"
            );
            return;
        }

        match subscriber.push(&frame) {
            Ok(()) => {
                stats.record_ping();
                stats.record_delivered(1);
                tracing::trace!(subscriber = subscriber.id(), "Ping sent");
            }
            Err(e) => {
                stats.record_push_failures(1);
                tracing::warn!(
                    room = %subscriber.room_id(),
                    subscriber = subscriber.id(),
                    error = %e,
                    "Keep-alive ping failed, removing subscriber"
                );
                registry.remove(&subscriber);
                return;
            }
        }
    }
}
