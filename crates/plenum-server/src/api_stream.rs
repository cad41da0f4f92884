//! SSE change-notification stream handlers.

use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::{sse::Event, Sse},
};
use futures_util::Stream;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Handler for `GET /api/events/{eventId}/stream`.
///
/// Streams the event's change notifications. Payloads carry only the table,
/// the operation, and the record id; clients re-query to see the new state.
pub async fn event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.hub.subscribe(&event_id);
    let stream = BroadcastStream::new(rx);

    let mapped_stream = stream.filter_map(|result| {
        match result {
            Ok(notification) => match serde_json::to_string(&notification) {
                Ok(data) => Some(Ok(Event::default().data(data))),
                Err(e) => {
                    tracing::error!("failed to serialize change notification: {}", e);
                    None
                }
            },
            Err(broadcast_error) => {
                // A lagged subscriber should refresh; nothing to replay here.
                tracing::warn!(
                    error = %broadcast_error,
                    "change notification stream lagged; notifications were dropped for this subscriber"
                );
                None
            }
        }
    });

    Sse::new(mapped_stream).keep_alive(axum::response::sse::KeepAlive::default())
}
