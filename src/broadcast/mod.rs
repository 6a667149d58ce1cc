//! Event broadcasting and connection lifecycle
//!
//! The [`Broadcaster`] delivers one event to every active subscriber of a
//! room. A push that fails removes that subscriber and delivery continues
//! with the rest. When a room has nobody subscribed yet, a single re-check
//! runs after a short delay to absorb the race between a client's subscribe
//! request and the first event meant for it; after that the event is dropped.
//!
//! Each connection is represented by a [`RoomStream`], which owns:
//!
//! - the receiving half of the subscriber's frame channel,
//! - a guard that deregisters the subscriber when the stream is dropped,
//! - the connection's [`KeepAlive`] task, aborted on drop.
//!
//! ```text
//!  write path ──► publish(room, event)
//!                    │ encode once
//!                    ▼
//!              list_active(room) ──empty──► sleep(retry_delay) ──► list_active(room)
//!                    │                                               │
//!                    ▼                                               ▼
//!              push to each ◄────────────────────────────────────────┘
//!                    │ failure
//!                    ▼
//!              unsubscribe(room, subscriber)
//! ```

pub mod keepalive;
pub mod publisher;
pub mod stream;

pub use keepalive::KeepAlive;
pub use publisher::{Broadcaster, PublishOutcome};
pub use stream::RoomStream;
