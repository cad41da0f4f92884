//! Event and seat handlers.

use crate::{publish_change, with_conn, AppState};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use plenum_store::{
    claim_seat, create_event, create_seats, get_event, get_seat_by_token, list_events_by_moderator,
    list_seats, set_event_flags, update_event_status, CreateEventParams, Event, Seat,
};
use plenum_types::{ChangeOp, EventFlags, EventStatus, StoreTable};
use serde::Deserialize;
use std::sync::Arc;

/// Maximum length for an event title.
const MAX_TITLE_LEN: usize = 256;
/// Maximum length for an event description.
const MAX_DESCRIPTION_LEN: usize = 4096;
/// Maximum number of seats created in one request.
const MAX_SEATS_PER_REQUEST: usize = 500;

#[derive(Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: Option<String>,
    pub moderator_id: String,
    #[serde(default = "default_max_participants")]
    pub max_participants: u32,
    #[serde(default = "default_event_status")]
    pub status: EventStatus,
    #[serde(default)]
    pub flags: EventFlags,
}

fn default_max_participants() -> u32 {
    50
}

// The dashboard creates events directly as active.
fn default_event_status() -> EventStatus {
    EventStatus::Active
}

#[derive(Deserialize)]
pub struct ListEventsParams {
    pub moderator_id: String,
}

#[derive(Deserialize)]
pub struct UpdateEventRequest {
    pub status: Option<EventStatus>,
    pub flags: Option<EventFlags>,
}

#[derive(Deserialize)]
pub struct CreateSeatsRequest {
    pub seat_numbers: Vec<String>,
}

#[derive(Deserialize)]
pub struct ClaimSeatRequest {
    pub profile_id: String,
}

/// POST /api/events
pub async fn create_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateEventRequest>,
) -> Result<Json<Event>, StatusCode> {
    if payload.title.is_empty() || payload.title.len() > MAX_TITLE_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if let Some(ref description) = payload.description {
        if description.len() > MAX_DESCRIPTION_LEN {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let params = CreateEventParams {
        title: payload.title,
        description: payload.description,
        moderator_id: payload.moderator_id,
        max_participants: payload.max_participants,
        status: payload.status,
        flags: payload.flags,
    };
    let event = with_conn(&state.pool, move |conn| create_event(conn, &params)).await?;

    publish_change(
        &state,
        &event.id,
        StoreTable::Events,
        ChangeOp::Insert,
        &event.id,
    );
    Ok(Json(event))
}

/// GET /api/events?moderator_id=…
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListEventsParams>,
) -> Result<Json<Vec<Event>>, StatusCode> {
    let events = with_conn(&state.pool, move |conn| {
        list_events_by_moderator(conn, &params.moderator_id)
    })
    .await?;
    Ok(Json(events))
}

/// GET /api/events/{eventId}
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, StatusCode> {
    let event = with_conn(&state.pool, move |conn| get_event(conn, &event_id)).await?;
    Ok(Json(event))
}

/// PATCH /api/events/{eventId}
///
/// Applies a status transition, a flag replacement, or both.
pub async fn update_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(payload): Json<UpdateEventRequest>,
) -> Result<Json<Event>, StatusCode> {
    if payload.status.is_none() && payload.flags.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = event_id.clone();
    let event = with_conn(&state.pool, move |conn| {
        let mut event = get_event(conn, &id)?;
        if let Some(status) = payload.status {
            event = update_event_status(conn, &id, status)?;
        }
        if let Some(flags) = payload.flags {
            event = set_event_flags(conn, &id, flags)?;
        }
        Ok(event)
    })
    .await?;

    publish_change(
        &state,
        &event_id,
        StoreTable::Events,
        ChangeOp::Update,
        &event.id,
    );
    Ok(Json(event))
}

/// POST /api/events/{eventId}/seats
pub async fn create_seats_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(payload): Json<CreateSeatsRequest>,
) -> Result<Json<Vec<Seat>>, StatusCode> {
    if payload.seat_numbers.is_empty() || payload.seat_numbers.len() > MAX_SEATS_PER_REQUEST {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = event_id.clone();
    let seats = with_conn(&state.pool, move |conn| {
        // Surface a bad event id as 404 rather than a foreign-key failure.
        let _ = get_event(conn, &id)?;
        create_seats(conn, &id, &payload.seat_numbers)
    })
    .await?;

    for seat in &seats {
        publish_change(
            &state,
            &event_id,
            StoreTable::EventSeats,
            ChangeOp::Insert,
            &seat.id,
        );
    }
    Ok(Json(seats))
}

/// GET /api/events/{eventId}/seats
pub async fn list_seats_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Seat>>, StatusCode> {
    let seats = with_conn(&state.pool, move |conn| list_seats(conn, &event_id)).await?;
    Ok(Json(seats))
}

/// GET /api/seats/by-token/{qrToken}
///
/// Resolves a scanned QR token to its seat.
pub async fn get_seat_by_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(qr_token): Path<String>,
) -> Result<Json<Seat>, StatusCode> {
    let seat = with_conn(&state.pool, move |conn| get_seat_by_token(conn, &qr_token)).await?;
    Ok(Json(seat))
}

/// POST /api/seats/{seatId}/claim
///
/// Exactly one concurrent claimant wins; the rest get 409.
pub async fn claim_seat_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(seat_id): Path<String>,
    Json(payload): Json<ClaimSeatRequest>,
) -> Result<Json<Seat>, StatusCode> {
    let seat = with_conn(&state.pool, move |conn| {
        claim_seat(conn, &seat_id, &payload.profile_id)
    })
    .await?;

    publish_change(
        &state,
        &seat.event_id,
        StoreTable::EventSeats,
        ChangeOp::Update,
        &seat.id,
    );
    Ok(Json(seat))
}
