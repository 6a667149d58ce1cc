//! Connection lifecycle object
//!
//! A [`RoomStream`] is what an HTTP response body reads from. It yields the
//! frames pushed to its subscriber. It ends on broadcaster shutdown, or once
//! the subscriber has been removed from the registry and its buffered frames
//! are drained. When it is dropped (client closed the connection, or the
//! server cancelled the response) the subscriber is removed from the registry
//! and the keep-alive task is aborted before `drop` returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::registry::{RoomId, Subscriber, SubscriberGuard};

use super::keepalive::KeepAlive;

/// Frames for one client connection
pub struct RoomStream {
    receiver: mpsc::Receiver<Bytes>,
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    // Dropped in declaration order: stop pinging, then deregister
    keepalive: KeepAlive,
    guard: SubscriberGuard,
    finished: bool,
}

impl RoomStream {
    pub(super) fn new(
        receiver: mpsc::Receiver<Bytes>,
        guard: SubscriberGuard,
        keepalive: KeepAlive,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            shutdown: Box::pin(shutdown.cancelled_owned()),
            keepalive,
            guard,
            finished: false,
        }
    }

    /// Subscriber backing this connection
    pub fn subscriber(&self) -> &Arc<Subscriber> {
        self.guard.subscriber()
    }

    /// Room this connection is subscribed to
    pub fn room_id(&self) -> &RoomId {
        self.guard.subscriber().room_id()
    }

    /// Check whether the keep-alive task is still running
    pub fn is_keepalive_running(&self) -> bool {
        !self.keepalive.is_finished()
    }
}

impl Stream for RoomStream {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        if this.shutdown.as_mut().poll(cx).is_ready() {
            this.finished = true;
            return Poll::Ready(None);
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for RoomStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomStream")
            .field("room_id", self.room_id())
            .field("subscriber", &self.subscriber().id())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio_test::{assert_pending, assert_ready};

    use super::*;
    use crate::broadcast::{Broadcaster, PublishOutcome};
    use crate::event::{decode, ChatEvent};
    use crate::registry::{RegistryConfig, RoomRegistry};

    fn room(id: &str) -> RoomId {
        RoomId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_drop_deregisters() {
        let bc = Broadcaster::new(Arc::new(RoomRegistry::new()));
        let r = room("r");

        let stream = bc.connect(&r);
        let subscriber = stream.subscriber().clone();
        assert_eq!(bc.registry().count(&r), 1);

        drop(stream);

        assert_eq!(bc.registry().count(&r), 0);
        assert!(!subscriber.is_active());
    }

    #[tokio::test]
    async fn test_failed_push_ends_stream() {
        let config = RegistryConfig::default().subscriber_buffer(1);
        let bc = Broadcaster::new(Arc::new(RoomRegistry::with_config(config)));
        let r = room("r");

        // The `connected` frame fills the buffer, so the next push fails
        let mut stream = bc.connect(&r);
        let outcome = bc.publish(&r, ChatEvent::user_joined(r.clone(), "bob"));
        assert_eq!(
            outcome,
            PublishOutcome::Delivered {
                recipients: 0,
                failed: 1
            }
        );
        assert!(!stream.subscriber().is_active());

        let connected = stream.next().await.unwrap();
        assert_eq!(decode(&connected).unwrap(), ChatEvent::connected(r.clone()));
        let end = tokio::time::timeout(Duration::from_secs(1), stream.next()).await;
        assert_eq!(end, Ok(None));
    }

    #[tokio::test]
    async fn test_external_remove_wakes_and_ends_stream() {
        let bc = Broadcaster::new(Arc::new(RoomRegistry::new()));
        let r = room("r");
        let mut stream = bc.connect(&r);
        let _connected = stream.next().await.unwrap();

        let mut next = tokio_test::task::spawn(stream.next());
        assert_pending!(next.poll());

        let subscriber = bc.registry().list_active(&r).remove(0);
        bc.registry().remove(&subscriber);

        assert!(next.is_woken());
        assert_eq!(assert_ready!(next.poll()), None);
    }

    #[tokio::test]
    async fn test_wakes_on_publish() {
        let bc = Broadcaster::new(Arc::new(RoomRegistry::new()));
        let r = room("r");
        let mut stream = bc.connect(&r);
        let _connected = stream.next().await.unwrap();

        let mut next = tokio_test::task::spawn(stream.next());
        assert_pending!(next.poll());

        bc.publish(&r, ChatEvent::user_joined(r.clone(), "bob"));

        assert!(next.is_woken());
        let frame = assert_ready!(next.poll()).unwrap();
        assert!(matches!(decode(&frame).unwrap(), ChatEvent::UserJoined { .. }));
    }

    #[tokio::test]
    async fn test_shutdown_ends_stream() {
        let bc = Broadcaster::new(Arc::new(RoomRegistry::new()));
        let r = room("r");
        let mut stream = bc.connect(&r);

        bc.shutdown();

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_pings_through_stream() {
        let config = RegistryConfig::default().keepalive_interval(Duration::from_secs(30));
        let bc = Broadcaster::new(Arc::new(RoomRegistry::with_config(config)));
        let r = room("r");
        let mut stream = bc.connect(&r);
        let _connected = stream.next().await.unwrap();

        let ping = stream.next().await.unwrap();
        assert_eq!(decode(&ping).unwrap(), ChatEvent::Ping);
        assert!(stream.is_keepalive_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_stops_after_unsubscribe() {
        let bc = Broadcaster::new(Arc::new(RoomRegistry::new()));
        let r = room("r");
        let stream = bc.connect(&r);

        bc.registry().remove(stream.subscriber());
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(!stream.is_keepalive_running());
    }
}
