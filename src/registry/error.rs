//! Registry error types
//!
//! Error types for room registry operations and per-subscriber pushes.

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Room id was empty or whitespace
    #[error("Room id must not be empty")]
    EmptyRoomId,

    /// Registry already holds the maximum number of subscribers
    #[error("Subscriber limit reached ({0})")]
    SubscriberLimit(usize),
}

/// Reason a frame could not be pushed to a subscriber
///
/// Any push error means the subscriber is gone for good: the broadcaster and
/// the keep-alive task drop it from the registry and never push to it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// Subscriber was already marked inactive
    #[error("subscriber is inactive")]
    Inactive,
    /// Receiving half was dropped (client disconnected)
    #[error("subscriber channel closed")]
    Closed,
    /// Client stopped draining its channel
    #[error("subscriber channel full")]
    Full,
}
