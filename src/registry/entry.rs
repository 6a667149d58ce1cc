//! Subscriber entry and state types
//!
//! This module defines the per-connection state stored in the registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use super::error::PushError;
use super::room::RoomId;

/// Liveness of a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Connected and receiving frames
    Active,
    /// A push failed or the client disconnected; never becomes active again
    Inactive,
}

/// One open push channel belonging to one client connection
#[derive(Debug)]
pub struct Subscriber {
    /// Process-unique id, the subscriber's identity
    id: u64,

    /// Room this subscriber is bound to
    room_id: RoomId,

    /// Write half of the connection's frame channel, taken on deactivation
    /// so the connection's receiver sees the end of the stream
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,

    /// Cleared on the first failed push or on unsubscribe
    active: AtomicBool,

    /// When the connection subscribed
    connected_at: Instant,
}

impl Subscriber {
    pub(super) fn new(id: u64, room_id: RoomId, tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            id,
            room_id,
            tx: Mutex::new(Some(tx)),
            active: AtomicBool::new(true),
            connected_at: Instant::now(),
        }
    }

    /// Subscriber id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Room the subscriber belongs to
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// When the subscriber was registered
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Check whether the subscriber still accepts frames
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Current state
    pub fn state(&self) -> SubscriberState {
        if self.is_active() {
            SubscriberState::Active
        } else {
            SubscriberState::Inactive
        }
    }

    /// Mark inactive
    ///
    /// Returns `true` only for the call that performed the transition.
    /// Closes the frame channel: the connection drains what is already
    /// buffered and then ends.
    pub fn mark_inactive(&self) -> bool {
        let was_active = self.active.swap(false, Ordering::AcqRel);
        self.tx.lock().take();
        was_active
    }

    /// Push a frame without waiting
    ///
    /// Fails if the subscriber is already inactive, the client dropped its
    /// receiver, or the channel is full. The caller is responsible for
    /// removing the subscriber after a failure.
    pub fn push(&self, frame: &Bytes) -> Result<(), PushError> {
        if !self.is_active() {
            return Err(PushError::Inactive);
        }

        let tx = self.tx.lock();
        let Some(tx) = tx.as_ref() else {
            return Err(PushError::Inactive);
        };

        tx.try_send(frame.clone()).map_err(|e| match e {
            TrySendError::Full(_) => PushError::Full,
            TrySendError::Closed(_) => PushError::Closed,
        })
    }
}

/// Result of [`RoomRegistry::subscribe`](super::RoomRegistry::subscribe)
///
/// The subscriber handle goes to whoever pushes; the receiver goes to the
/// connection that streams frames to the client.
#[derive(Debug)]
pub struct Subscription {
    /// Registered subscriber, shared with the registry
    pub subscriber: std::sync::Arc<Subscriber>,
    /// Frames pushed to the subscriber, in push order
    pub receiver: mpsc::Receiver<Bytes>,
}

/// Statistics for a room
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStats {
    /// Room id
    pub room_id: RoomId,
    /// Subscribers currently registered
    pub subscribers: usize,
}
