//! Per-room server-sent event fan-out
//!
//! `roomcast` pushes chat events (new messages, reactions, presence changes) to
//! browsers holding long-lived `text/event-stream` connections, scoped per room.
//!
//! The crate has two core pieces:
//!
//! - [`RoomRegistry`] tracks the live subscribers of every room.
//! - [`Broadcaster`] serializes an event once and pushes the frame to every
//!   active subscriber of a room, dropping subscribers whose channel is gone.
//!
//! The write path (persistence, validation) lives outside this crate. It calls
//! [`Broadcaster::publish`] after a successful write and never waits on it.
//!
//! # Example
//!
//! ```no_run
//! use roomcast::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> roomcast::Result<()> {
//!     let server = ChatServer::new(ServerConfig::default());
//!     let broadcaster = server.broadcaster().clone();
//!     // hand `broadcaster` to the write-path handlers here
//!     # drop(broadcaster);
//!     server.run().await
//! }
//! ```

pub mod broadcast;
pub mod error;
pub mod event;
pub mod registry;
pub mod server;
pub mod stats;

pub use broadcast::{Broadcaster, KeepAlive, PublishOutcome, RoomStream};
pub use error::{Error, Result};
pub use event::{ChatEvent, ChatMessage, MessageSender, Reactions, RoomUser, UserStatus};
pub use registry::{RegistryConfig, RoomId, RoomRegistry, Subscriber, Subscription};
pub use server::{ChatServer, ServerConfig};
pub use stats::{BroadcastStats, BroadcastStatsSnapshot};
