//! Room broadcaster
//!
//! Serializes an event once and pushes the frame to the room's subscribers.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::event::{encode, ChatEvent, EventKind};
use crate::registry::{
    RegistryError, RoomId, RoomRegistry, Subscriber, SubscriberGuard, Subscription,
};
use crate::stats::BroadcastStats;

use super::keepalive::KeepAlive;
use super::stream::RoomStream;

/// What [`Broadcaster::publish`] did with an event
///
/// Informational only; the write path is free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Frame pushed to the snapshot of active subscribers
    Delivered {
        /// Subscribers that accepted the frame
        recipients: usize,
        /// Subscribers whose push failed and were removed
        failed: usize,
    },
    /// Room had no subscribers; one deferred re-check is pending
    RetryScheduled,
    /// Event discarded (broadcaster shut down, encode failure, or no runtime)
    Dropped,
}

/// Pushes events to the subscribers of a room
///
/// Cheap to clone; every clone shares the same registry, counters and
/// shutdown signal. Construct one at server start and hand clones to the
/// request handlers.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
    stats: Arc<BroadcastStats>,
    shutdown: CancellationToken,
}

impl Broadcaster {
    /// Create a broadcaster over an existing registry
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self {
            registry,
            stats: Arc::new(BroadcastStats::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the room registry
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Get the fan-out counters
    pub fn stats(&self) -> &Arc<BroadcastStats> {
        &self.stats
    }

    /// Check whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Publish an event to every active subscriber of a room
    ///
    /// Never fails and never blocks: a subscriber whose push fails is removed
    /// and the remaining subscribers still get the frame. If the room has no
    /// subscribers, the room is checked once more after the configured retry
    /// delay and the event is dropped if it is still empty.
    ///
    /// Call only after the event has been durably written. Must be called
    /// from within a Tokio runtime for the retry to be scheduled.
    pub fn publish(&self, room_id: &RoomId, event: ChatEvent) -> PublishOutcome {
        self.stats.record_publish();
        let kind = event.kind();

        if self.is_shut_down() {
            tracing::debug!(room = %room_id, kind = %kind, "Broadcaster shut down, event dropped");
            self.stats.record_dropped();
            return PublishOutcome::Dropped;
        }

        let subscribers = self.registry.list_active(room_id);

        let frame = match encode(&event) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(room = %room_id, kind = %kind, error = %e, "Failed to encode event");
                self.stats.record_dropped();
                return PublishOutcome::Dropped;
            }
        };

        if subscribers.is_empty() {
            return self.schedule_retry(room_id.clone(), kind, frame);
        }

        let (recipients, failed) = self.deliver(room_id, kind, &frame, &subscribers);
        PublishOutcome::Delivered { recipients, failed }
    }

    /// Open a connection to a room
    ///
    /// Registers a subscriber, pushes the `connected` frame and starts the
    /// keep-alive task. Dropping the returned stream tears all of that down.
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self, room_id: &RoomId) -> RoomStream {
        self.open(room_id, self.registry.subscribe(room_id))
    }

    /// Open a connection unless the registry already holds `limit` subscribers
    ///
    /// A `limit` of 0 means unlimited. See [`RoomRegistry::try_subscribe`].
    pub fn try_connect(&self, room_id: &RoomId, limit: usize) -> Result<RoomStream, RegistryError> {
        let subscription = self.registry.try_subscribe(room_id, limit)?;
        Ok(self.open(room_id, subscription))
    }

    fn open(&self, room_id: &RoomId, subscription: Subscription) -> RoomStream {
        let Subscription {
            subscriber,
            receiver,
        } = subscription;
        self.stats.record_connection();

        let guard = SubscriberGuard::new(Arc::clone(&self.registry), Arc::clone(&subscriber));

        match encode(&ChatEvent::connected(room_id.clone())) {
            Ok(frame) => {
                self.deliver(room_id, EventKind::Connected, &frame, std::slice::from_ref(&subscriber));
            }
            Err(e) => {
                tracing::warn!(room = %room_id, error = %e, "Failed to encode connected frame");
            }
        }

        let keepalive = KeepAlive::spawn(
            Arc::clone(&self.registry),
            subscriber,
            self.registry.config().keepalive_interval,
            Arc::clone(&self.stats),
        );

        RoomStream::new(receiver, guard, keepalive, self.shutdown.clone())
    }

    /// Stop the fan-out layer
    ///
    /// Cancels pending retries, ends every open [`RoomStream`] and drops all
    /// subscribers. Later publishes are dropped.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        let closed = self.registry.close_all();
        tracing::info!(subscribers = closed, "Broadcaster shut down");
    }

    fn schedule_retry(&self, room_id: RoomId, kind: EventKind, frame: Bytes) -> PublishOutcome {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(room = %room_id, kind = %kind, "No runtime for retry, event dropped");
                self.stats.record_dropped();
                return PublishOutcome::Dropped;
            }
        };

        let delay = self.registry.config().retry_delay;
        tracing::debug!(
            room = %room_id,
            kind = %kind,
            delay_ms = delay.as_millis() as u64,
            "No subscribers, retrying broadcast"
        );
        self.stats.record_retry_scheduled();

        let this = self.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = this.shutdown.cancelled() => {
                    tracing::debug!(room = %room_id, kind = %kind, "Retry cancelled by shutdown");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let subscribers = this.registry.list_active(&room_id);
            if subscribers.is_empty() {
                this.stats.record_dropped();
                tracing::info!(room = %room_id, kind = %kind, "Still no subscribers, event dropped");
                return;
            }

            this.stats.record_retry_delivered();
            tracing::debug!(
                room = %room_id,
                kind = %kind,
                subscribers = subscribers.len(),
                "Retrying broadcast"
            );
            this.deliver(&room_id, kind, &frame, &subscribers);
        });

        PublishOutcome::RetryScheduled
    }

    /// Push one frame to each subscriber independently
    ///
    /// Returns `(recipients, failed)`.
    fn deliver(
        &self,
        room_id: &RoomId,
        kind: EventKind,
        frame: &Bytes,
        subscribers: &[Arc<Subscriber>],
    ) -> (usize, usize) {
        let mut recipients = 0;
        let mut failed = 0;

        for subscriber in subscribers {
            match subscriber.push(frame) {
                Ok(()) => recipients += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        room = %room_id,
                        subscriber = subscriber.id(),
                        kind = %kind,
                        error = %e,
                        "Push failed, removing subscriber"
                    );
                    self.registry.unsubscribe(room_id, subscriber);
                }
            }
        }

        self.stats.record_delivered(recipients as u64);
        if failed > 0 {
            self.stats.record_push_failures(failed as u64);
        }

        tracing::debug!(
            room = %room_id,
            kind = %kind,
            recipients,
            failed,
            "Broadcast event"
        );

        (recipients, failed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use futures::{FutureExt, StreamExt};

    use super::*;
    use crate::event::{decode, ChatMessage};

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    fn broadcaster() -> Broadcaster {
        Broadcaster::new(Arc::new(RoomRegistry::new()))
    }

    fn chat(room_id: &RoomId, id: &str, text: &str) -> ChatEvent {
        let created_at = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        ChatEvent::message(room_id.clone(), ChatMessage::new(id, text, "a", created_at))
    }

    #[tokio::test]
    async fn test_connect_then_message() {
        let bc = broadcaster();
        let r1 = room("r1");
        let mut stream = bc.connect(&r1);

        let first = stream.next().await.unwrap();
        assert_eq!(decode(&first).unwrap(), ChatEvent::connected(r1.clone()));

        let event = chat(&r1, "m1", "hi");
        let outcome = bc.publish(&r1, event.clone());
        assert_eq!(outcome, PublishOutcome::Delivered { recipients: 1, failed: 0 });

        let frame = stream.next().await.unwrap();
        let value: serde_json::Value =
            serde_json::from_slice(frame.strip_prefix(b"data: ").unwrap()).unwrap();
        assert_eq!(value["type"], "message");
        assert_eq!(value["roomId"], "r1");
        assert_eq!(value["message"]["id"], "m1");
        assert_eq!(value["message"]["text"], "hi");
        assert_eq!(value["message"]["sender"]["username"], "a");
        assert_eq!(value["message"]["reactions"], serde_json::json!({}));
        assert_eq!(decode(&frame).unwrap(), event);

        // Exactly one frame per publish
        assert!(stream.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn test_broken_subscriber_does_not_block_others() {
        let bc = broadcaster();
        let r2 = room("r2");
        let s1 = bc.registry().subscribe(&r2);
        let mut s2 = bc.registry().subscribe(&r2);

        let s1_handle = s1.subscriber.clone();
        drop(s1);

        let outcome = bc.publish(&r2, chat(&r2, "m1", "hi"));
        assert_eq!(outcome, PublishOutcome::Delivered { recipients: 1, failed: 1 });

        assert!(s2.receiver.try_recv().is_ok());
        assert!(!s1_handle.is_active());
        let active = bc.registry().list_active(&r2);
        assert_eq!(active.len(), 1);
        assert!(active.iter().all(|s| s.id() != s1_handle.id()));

        // No further push is attempted on the failed subscriber
        let outcome = bc.publish(&r2, chat(&r2, "m2", "again"));
        assert_eq!(outcome, PublishOutcome::Delivered { recipients: 1, failed: 0 });
        assert_eq!(bc.stats().snapshot().push_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_within_retry_window() {
        let bc = broadcaster();
        let r3 = room("r3");
        let event = chat(&r3, "m1", "early");

        assert_eq!(bc.publish(&r3, event.clone()), PublishOutcome::RetryScheduled);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut stream = bc.connect(&r3);

        let first = stream.next().await.unwrap();
        assert_eq!(decode(&first).unwrap(), ChatEvent::connected(r3.clone()));

        let retried = tokio::time::timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("retry should deliver")
            .unwrap();
        assert_eq!(decode(&retried).unwrap(), event);

        let snap = bc.stats().snapshot();
        assert_eq!(snap.retries_scheduled, 1);
        assert_eq!(snap.retries_delivered, 1);
        assert_eq!(snap.events_dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_subscriber_after_retry_window() {
        let bc = broadcaster();
        let r3 = room("r3");

        assert_eq!(bc.publish(&r3, chat(&r3, "m1", "lost")), PublishOutcome::RetryScheduled);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let mut stream = bc.connect(&r3);

        let first = stream.next().await.unwrap();
        assert_eq!(decode(&first).unwrap(), ChatEvent::connected(r3.clone()));

        let next = tokio::time::timeout(Duration::from_secs(1), stream.next()).await;
        assert!(next.is_err(), "dropped event must not be delivered");
        assert_eq!(bc.stats().snapshot().events_dropped, 1);
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let bc = broadcaster();
        let a = room("a");
        let b = room("b");
        let mut in_a = bc.registry().subscribe(&a);
        let mut in_b = bc.registry().subscribe(&b);

        bc.publish(&a, chat(&a, "m1", "only a"));

        assert!(in_a.receiver.try_recv().is_ok());
        assert!(in_b.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_order_per_subscriber() {
        let bc = broadcaster();
        let r = room("r");
        let mut sub = bc.registry().subscribe(&r);

        for i in 0..5 {
            bc.publish(&r, chat(&r, &format!("m{}", i), "x"));
        }

        for i in 0..5 {
            let frame = sub.receiver.try_recv().unwrap();
            match decode(&frame).unwrap() {
                ChatEvent::Message { message, .. } => assert_eq!(message.id, format!("m{}", i)),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_frame_shared_across_subscribers() {
        let bc = broadcaster();
        let r = room("r");
        let mut a = bc.registry().subscribe(&r);
        let mut b = bc.registry().subscribe(&r);

        bc.publish(&r, chat(&r, "m1", "hi"));

        let fa = a.receiver.try_recv().unwrap();
        let fb = b.receiver.try_recv().unwrap();
        // Same allocation, not two serializations
        assert_eq!(fa.as_ptr(), fb.as_ptr());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_retry() {
        let bc = broadcaster();
        let r = room("r");

        assert_eq!(bc.publish(&r, chat(&r, "m1", "x")), PublishOutcome::RetryScheduled);
        bc.shutdown();

        let mut sub = bc.registry().subscribe(&r);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(sub.receiver.try_recv().is_err());
        assert_eq!(bc.stats().snapshot().retries_delivered, 0);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_dropped() {
        let bc = broadcaster();
        let r = room("r");
        let _sub = bc.registry().subscribe(&r);

        bc.shutdown();

        assert_eq!(bc.publish(&r, chat(&r, "m1", "x")), PublishOutcome::Dropped);
        assert!(bc.is_shut_down());
    }

    #[test]
    fn test_publish_without_runtime_drops() {
        let bc = broadcaster();
        let r = room("r");

        assert_eq!(bc.publish(&r, chat(&r, "m1", "x")), PublishOutcome::Dropped);
        assert_eq!(bc.stats().snapshot().events_dropped, 1);
    }

    #[tokio::test]
    async fn test_full_subscriber_is_removed() {
        let registry = RoomRegistry::with_config(
            crate::registry::RegistryConfig::default().subscriber_buffer(1),
        );
        let bc = Broadcaster::new(Arc::new(registry));
        let r = room("r");
        let slow = bc.registry().subscribe(&r);

        bc.publish(&r, chat(&r, "m1", "x"));
        let outcome = bc.publish(&r, chat(&r, "m2", "x"));

        assert_eq!(outcome, PublishOutcome::Delivered { recipients: 0, failed: 1 });
        assert!(!slow.subscriber.is_active());
        assert_eq!(bc.registry().count(&r), 0);
    }
}
