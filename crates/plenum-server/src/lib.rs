//! Plenum server library logic.

pub mod api_events;
pub mod api_participants;
pub mod api_questions;
pub mod api_stream;
pub mod api_voice;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use plenum_db::DbPool;
use plenum_realtime::RealtimeHub;
use plenum_store::StoreError;
use plenum_types::{ChangeNotification, ChangeOp, StoreTable};
use plenum_voice::{ContextualResponder, SpeechSynthesizer};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Change-notification hub.
    pub hub: Arc<RealtimeHub>,
    /// Answer generator for voice responses.
    pub responder: ContextualResponder,
    /// Text-to-speech provider.
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    /// Voice used when a request does not name one.
    pub default_voice: String,
}

/// Maximum request body size (2 MiB). Protects against OOM from oversized payloads.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Maps a [`StoreError`] to the correct HTTP status code, logging 500s.
///
/// `NotFound` → 404, transition and occupancy conflicts → 409, everything
/// else → 500.
pub(crate) fn store_err_to_status(e: StoreError) -> StatusCode {
    match e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::InvalidTransition { .. }
        | StoreError::SeatOccupied(_)
        | StoreError::DuplicateSeatNumber { .. } => StatusCode::CONFLICT,
        ref err if err.is_constraint_violation() => StatusCode::CONFLICT,
        err => {
            tracing::error!(error = %err, "store operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Runs a store operation on a pooled connection off the async runtime.
pub(crate) async fn with_conn<T, F>(pool: &DbPool, f: F) -> Result<T, StatusCode>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, StoreError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(|e| {
            tracing::error!(error = %e, "failed to get db connection");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        f(&conn).map_err(store_err_to_status)
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
}

/// Publishes a change notification for a committed write.
pub(crate) fn publish_change(
    state: &AppState,
    event_id: &str,
    table: StoreTable,
    op: ChangeOp,
    record_id: &str,
) {
    state
        .hub
        .publish(event_id, ChangeNotification::new(table, op, record_id));
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/events",
            post(api_events::create_event_handler).get(api_events::list_events_handler),
        )
        .route(
            "/api/events/{eventId}",
            get(api_events::get_event_handler).patch(api_events::update_event_handler),
        )
        .route(
            "/api/events/{eventId}/seats",
            post(api_events::create_seats_handler).get(api_events::list_seats_handler),
        )
        .route(
            "/api/seats/by-token/{qrToken}",
            get(api_events::get_seat_by_token_handler),
        )
        .route(
            "/api/seats/{seatId}/claim",
            post(api_events::claim_seat_handler),
        )
        .route(
            "/api/events/{eventId}/participants",
            post(api_participants::join_event_handler)
                .get(api_participants::list_participants_handler),
        )
        .route(
            "/api/events/{eventId}/participants/{profileId}",
            delete(api_participants::leave_event_handler),
        )
        .route(
            "/api/participants/{participantId}",
            patch(api_participants::update_participant_handler),
        )
        .route(
            "/api/events/{eventId}/questions",
            post(api_questions::create_question_handler)
                .get(api_questions::list_questions_handler),
        )
        .route(
            "/api/questions/{questionId}",
            patch(api_questions::update_question_handler)
                .delete(api_questions::delete_question_handler),
        )
        .route(
            "/api/events/{eventId}/stream",
            get(api_stream::event_stream_handler),
        )
        .route(
            "/api/voice-response",
            post(api_voice::voice_response_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
