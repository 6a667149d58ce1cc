//! Chat events and their wire frames
//!
//! This module provides:
//! - The closed set of events pushed to subscribers ([`ChatEvent`])
//! - Payload records carried by those events
//! - The `text/event-stream` frame codec

pub mod chat;
pub mod frame;

pub use chat::{ChatEvent, ChatMessage, EventKind, MessageSender, Reactions, RoomUser, UserStatus};
pub use frame::{decode, encode, FrameError};
