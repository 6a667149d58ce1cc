//! Crate-level error type

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::event::frame::FrameError;
use crate::registry::RegistryError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the server and the subscribe endpoint
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Subscribe request without a room id
    #[error("Room ID is required")]
    MissingRoomId,

    /// Subscriber limit reached
    #[error("Subscriber limit reached ({0})")]
    TooManySubscribers(usize),

    /// Registry rejected the request
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Frame could not be encoded or decoded
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Socket or bind failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// HTTP status for this error when returned from a handler
    pub fn status(&self) -> StatusCode {
        match self {
            Error::TooManySubscribers(_) | Error::Registry(RegistryError::SubscriberLimit(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::MissingRoomId | Error::Registry(_) => StatusCode::BAD_REQUEST,
            Error::Frame(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
