//! Server-sent events feed of the event bus.
//!
//! `GET /api/sse/{client_id}` registers `client_id` as a subscriber for as
//! long as the response stream is open. Each bus event becomes an SSE
//! message named after the event; idle windows produce `: keep-alive`
//! comments.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio_stream::{Stream, StreamExt};

use chainflow_core::events::{BusEvent, BusMessage};
use chainflow_core::{AppState, ServerError};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/broadcast", post(broadcast))
        .route("/{client_id}", get(subscribe))
}

async fn subscribe(
    State(state): State<AppState>,
    Path(client_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.event_bus.subscribe(&client_id);
    let stream = subscription.into_stream().map(|message| {
        Ok::<_, Infallible>(match message {
            BusMessage::Event(event) => to_sse_event(&event),
            BusMessage::KeepAlive => Event::default().comment("keep-alive"),
        })
    });

    Sse::new(stream)
}

fn to_sse_event(event: &BusEvent) -> Event {
    Event::default()
        .event(event.event.clone())
        .data(event.data.to_string())
}

#[derive(Debug, Deserialize)]
struct BroadcastRequest {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Publish an arbitrary event to every connected client.
async fn broadcast(
    State(state): State<AppState>,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>, ServerError> {
    if body.event.trim().is_empty() {
        return Err(ServerError::BadRequest("Event name is required".into()));
    }
    let delivered = state.event_bus.publish(&body.event, body.data);
    Ok(Json(serde_json::json!({ "delivered": delivered })))
}
