//! Room registry for per-room fan-out
//!
//! The registry tracks which subscribers are connected to which room. Each
//! subscriber owns a bounded `tokio::sync::mpsc` channel; the write half lives
//! in the registry, the read half is drained by the client's HTTP response.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<RoomRegistry>
//!                 ┌──────────────────────────────┐
//!                 │ rooms: HashMap<RoomId,       │
//!                 │   HashMap<id, Subscriber {   │
//!                 │     tx: mpsc::Sender<Bytes>, │
//!                 │     active: AtomicBool,      │
//!                 │   }>                         │
//!                 │ >                            │
//!                 └──────────────┬───────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        │                       │                       │
//!        ▼                       ▼                       ▼
//!   [Write path]           [Connection]            [Connection]
//!   publish()              rx.recv()               rx.recv()
//!        │                       │                       │
//!        └──► list_active() ──► push(frame) ──► text/event-stream
//! ```
//!
//! # Identity
//!
//! Subscribers are compared by a process-unique id assigned at subscribe time,
//! never by content. A subscriber belongs to exactly one room for its whole life.
//!
//! # Zero-Copy Frames
//!
//! Frames are `bytes::Bytes`, so pushing one frame to N subscribers clones a
//! reference count N times instead of the payload.

pub mod config;
pub mod entry;
pub mod error;
pub mod room;
pub mod store;

pub use config::RegistryConfig;
pub use entry::{RoomStats, Subscriber, SubscriberState, Subscription};
pub use error::{PushError, RegistryError};
pub use room::RoomId;
pub use store::{RoomRegistry, SubscriberGuard};
