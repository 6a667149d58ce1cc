//! Router and request handlers

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{HeaderName, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::registry::{RegistryError, RoomId, RoomStats};
use crate::stats::BroadcastStatsSnapshot;

use super::config::ServerConfig;

const X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

#[derive(Clone)]
struct AppState {
    broadcaster: Broadcaster,
    max_subscribers: usize,
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(rename = "roomId")]
    room_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    rooms: usize,
    subscribers: usize,
    #[serde(flatten)]
    counters: BroadcastStatsSnapshot,
}

/// Build the router for the event endpoints
pub fn build_router(broadcaster: Broadcaster, config: &ServerConfig) -> Router {
    let state = AppState {
        broadcaster,
        max_subscribers: config.max_subscribers,
    };

    Router::new()
        .route("/events", get(subscribe))
        .route("/rooms/{room_id}", get(room_stats))
        .route("/stats", get(stats))
        .with_state(state)
}

/// GET /events?roomId=<id>
async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Response> {
    let room_id = query
        .room_id
        .filter(|id| !id.trim().is_empty())
        .ok_or(Error::MissingRoomId)?;
    let room_id = RoomId::new(room_id)?;

    let stream = match state.broadcaster.try_connect(&room_id, state.max_subscribers) {
        Ok(stream) => stream,
        Err(RegistryError::SubscriberLimit(limit)) => {
            tracing::warn!(room = %room_id, limit, "Subscriber rejected: limit reached");
            return Err(Error::TooManySubscribers(limit));
        }
        Err(e) => return Err(e.into()),
    };
    let body = Body::from_stream(stream.map(Ok::<_, Infallible>));

    let headers = [
        (CONTENT_TYPE, "text/event-stream"),
        (CACHE_CONTROL, "no-cache, no-transform"),
        (CONNECTION, "keep-alive"),
        (X_ACCEL_BUFFERING, "no"),
    ];

    Ok((headers, body).into_response())
}

/// GET /rooms/{room_id}
async fn room_stats(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomStats>> {
    let room_id = RoomId::new(room_id)?;
    let stats = state
        .broadcaster
        .registry()
        .room_stats(&room_id)
        .unwrap_or(RoomStats {
            room_id,
            subscribers: 0,
        });

    Ok(Json(stats))
}

/// GET /stats
async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let registry = state.broadcaster.registry();

    Json(StatsResponse {
        rooms: registry.room_count(),
        subscribers: registry.subscriber_count(),
        counters: state.broadcaster.stats().snapshot(),
    })
}
