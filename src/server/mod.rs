//! HTTP surface for the fan-out layer
//!
//! - `GET /events?roomId=<id>` opens a `text/event-stream` for a room
//! - `GET /rooms/{room_id}` reports the room's subscriber count
//! - `GET /stats` reports broadcaster counters

pub mod config;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use listener::ChatServer;
pub use routes::build_router;
