//! Statistics for the fan-out layer

pub mod metrics;

pub use metrics::{BroadcastStats, BroadcastStatsSnapshot};
