//! Room registry implementation
//!
//! The central registry that maps each room to the subscribers currently
//! connected to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use super::config::RegistryConfig;
use super::entry::{RoomStats, Subscriber, Subscription};
use super::error::RegistryError;
use super::room::RoomId;

type RoomSet = HashMap<u64, Arc<Subscriber>>;

/// Insert into the room's set, creating it on first use; returns the set size
fn insert(rooms: &mut HashMap<RoomId, RoomSet>, subscriber: &Arc<Subscriber>) -> usize {
    let set = rooms.entry(subscriber.room_id().clone()).or_default();
    set.insert(subscriber.id(), Arc::clone(subscriber));
    set.len()
}

fn log_added(subscriber: &Subscriber, count: usize) {
    tracing::info!(
        room = %subscriber.room_id(),
        subscriber = subscriber.id(),
        subscribers = count,
        "Subscriber added"
    );
}

/// Registry of live subscribers per room
///
/// Constructed once at server start and shared behind an `Arc`. Every
/// insert and remove happens under one write lock, so a publish snapshot
/// never observes a half-applied change. The lock is synchronous and never
/// held across an `.await`, which lets teardown run from `Drop`.
pub struct RoomRegistry {
    /// Map of room id to its subscriber set
    rooms: RwLock<HashMap<RoomId, RoomSet>>,

    /// Next subscriber id to hand out
    next_subscriber_id: AtomicU64,

    /// Configuration
    config: RegistryConfig,
}

impl RoomRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a new subscriber for a room
    ///
    /// The room's set is created on first use. Returns the subscriber handle
    /// together with the receiving half of its frame channel.
    pub fn subscribe(&self, room_id: &RoomId) -> Subscription {
        let (subscriber, receiver) = self.new_subscriber(room_id);

        let count = {
            let mut rooms = self.rooms.write();
            insert(&mut rooms, &subscriber)
        };

        log_added(&subscriber, count);
        Subscription {
            subscriber,
            receiver,
        }
    }

    /// Register a new subscriber unless the registry already holds `limit`
    ///
    /// The total is checked and the subscriber inserted under the same write
    /// lock, so concurrent callers never exceed the limit. A `limit` of 0
    /// means unlimited.
    pub fn try_subscribe(
        &self,
        room_id: &RoomId,
        limit: usize,
    ) -> Result<Subscription, RegistryError> {
        let (subscriber, receiver) = self.new_subscriber(room_id);

        let count = {
            let mut rooms = self.rooms.write();
            if limit > 0 && rooms.values().map(HashMap::len).sum::<usize>() >= limit {
                return Err(RegistryError::SubscriberLimit(limit));
            }
            insert(&mut rooms, &subscriber)
        };

        log_added(&subscriber, count);
        Ok(Subscription {
            subscriber,
            receiver,
        })
    }

    fn new_subscriber(&self, room_id: &RoomId) -> (Arc<Subscriber>, mpsc::Receiver<Bytes>) {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, receiver) = mpsc::channel(self.config.subscriber_buffer);
        (Arc::new(Subscriber::new(id, room_id.clone(), tx)), receiver)
    }

    /// Remove a subscriber from a room
    ///
    /// Idempotent: removing a subscriber that is not registered under
    /// `room_id` changes nothing, including for other rooms.
    pub fn unsubscribe(&self, room_id: &RoomId, subscriber: &Subscriber) {
        if subscriber.room_id() != room_id {
            tracing::debug!(
                room = %room_id,
                subscriber = subscriber.id(),
                actual_room = %subscriber.room_id(),
                "Unsubscribe room mismatch, ignoring"
            );
            return;
        }

        subscriber.mark_inactive();

        let remaining = {
            let mut rooms = self.rooms.write();
            rooms
                .get_mut(room_id)
                .and_then(|set| set.remove(&subscriber.id()).map(|_| set.len()))
        };

        if let Some(remaining) = remaining {
            tracing::info!(
                room = %room_id,
                subscriber = subscriber.id(),
                subscribers = remaining,
                connected_ms = subscriber.connected_at().elapsed().as_millis() as u64,
                "Subscriber removed"
            );
        }
    }

    /// Remove a subscriber from whichever room it belongs to
    pub fn remove(&self, subscriber: &Subscriber) {
        self.unsubscribe(subscriber.room_id(), subscriber);
    }

    /// Snapshot of the active subscribers of a room
    ///
    /// The returned handles stay valid if the registry changes afterwards;
    /// pushing to one that was removed in the meantime simply fails.
    pub fn list_active(&self, room_id: &RoomId) -> Vec<Arc<Subscriber>> {
        let rooms = self.rooms.read();

        rooms
            .get(room_id)
            .map(|set| {
                set.values()
                    .filter(|s| s.is_active())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of subscribers registered for a room
    pub fn count(&self, room_id: &RoomId) -> usize {
        self.rooms.read().get(room_id).map_or(0, HashMap::len)
    }

    /// Check whether a room key exists (possibly with no subscribers)
    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.rooms.read().contains_key(room_id)
    }

    /// Number of room keys, including empty ones
    pub fn room_count(&self) -> usize {
        self.rooms.read().len()
    }

    /// Total subscribers across all rooms
    pub fn subscriber_count(&self) -> usize {
        self.rooms.read().values().map(HashMap::len).sum()
    }

    /// Get room statistics
    pub fn room_stats(&self, room_id: &RoomId) -> Option<RoomStats> {
        self.rooms.read().get(room_id).map(|set| RoomStats {
            room_id: room_id.clone(),
            subscribers: set.len(),
        })
    }

    /// Drop room keys whose subscriber set is empty
    ///
    /// Returns the number of rooms removed.
    pub fn prune_empty_rooms(&self) -> usize {
        let mut rooms = self.rooms.write();
        let before = rooms.len();
        rooms.retain(|room_id, set| {
            let keep = !set.is_empty();
            if !keep {
                tracing::debug!(room = %room_id, "Empty room pruned");
            }
            keep
        });
        before - rooms.len()
    }

    /// Deactivate and drop every subscriber
    ///
    /// Used on shutdown. Returns the number of subscribers dropped.
    pub fn close_all(&self) -> usize {
        let drained: Vec<RoomSet> = self.rooms.write().drain().map(|(_, set)| set).collect();

        let mut closed = 0;
        for subscriber in drained.iter().flat_map(HashMap::values) {
            subscriber.mark_inactive();
            closed += 1;
        }

        tracing::info!(subscribers = closed, "Registry closed");
        closed
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let pruned = registry.prune_empty_rooms();
                if pruned > 0 {
                    tracing::debug!(rooms = pruned, "Registry cleanup");
                }
            }
        })
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deregisters a subscriber when dropped
///
/// Held by the connection that owns the subscriber so that closing the
/// connection removes it from the registry synchronously.
pub struct SubscriberGuard {
    registry: Arc<RoomRegistry>,
    subscriber: Arc<Subscriber>,
}

impl SubscriberGuard {
    pub fn new(registry: Arc<RoomRegistry>, subscriber: Arc<Subscriber>) -> Self {
        Self {
            registry,
            subscriber,
        }
    }

    /// The guarded subscriber
    pub fn subscriber(&self) -> &Arc<Subscriber> {
        &self.subscriber
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.subscriber);
    }
}
