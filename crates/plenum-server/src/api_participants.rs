//! Participant handlers.

use crate::{publish_change, with_conn, AppState};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use plenum_store::{
    assign_seat, get_participant, join_event, leave_event, list_participants, set_mic_active,
    update_participant_status, Participant,
};
use plenum_types::{ChangeOp, ParticipantStatus, StoreTable};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct JoinEventRequest {
    pub profile_id: String,
}

#[derive(Deserialize)]
pub struct UpdateParticipantRequest {
    pub status: Option<ParticipantStatus>,
    pub mic_active: Option<bool>,
    /// Seat to claim and record on the participant row.
    pub seat_id: Option<String>,
}

/// POST /api/events/{eventId}/participants
///
/// Joining twice returns the same row both times.
pub async fn join_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(payload): Json<JoinEventRequest>,
) -> Result<Json<Participant>, StatusCode> {
    let id = event_id.clone();
    let participant = with_conn(&state.pool, move |conn| {
        join_event(conn, &id, &payload.profile_id)
    })
    .await?;

    publish_change(
        &state,
        &event_id,
        StoreTable::EventParticipants,
        ChangeOp::Insert,
        &participant.id,
    );
    Ok(Json(participant))
}

/// GET /api/events/{eventId}/participants
pub async fn list_participants_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
) -> Result<Json<Vec<Participant>>, StatusCode> {
    let participants =
        with_conn(&state.pool, move |conn| list_participants(conn, &event_id)).await?;
    Ok(Json(participants))
}

/// PATCH /api/participants/{participantId}
///
/// Applies any combination of a status transition, a microphone toggle, and
/// a seat assignment.
pub async fn update_participant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(participant_id): Path<String>,
    Json(payload): Json<UpdateParticipantRequest>,
) -> Result<Json<Participant>, StatusCode> {
    if payload.status.is_none() && payload.mic_active.is_none() && payload.seat_id.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = participant_id.clone();
    let participant = with_conn(&state.pool, move |conn| {
        let mut participant = None;
        if let Some(status) = payload.status {
            participant = Some(update_participant_status(conn, &id, status)?);
        }
        if let Some(active) = payload.mic_active {
            participant = Some(set_mic_active(conn, &id, active)?);
        }
        if let Some(seat_id) = payload.seat_id {
            participant = Some(assign_seat(conn, &id, &seat_id)?);
        }
        Ok(participant)
    })
    .await?
    // The guard above rejects empty updates, so this never fires.
    .ok_or(StatusCode::BAD_REQUEST)?;

    publish_change(
        &state,
        &participant.event_id,
        StoreTable::EventParticipants,
        ChangeOp::Update,
        &participant.id,
    );
    Ok(Json(participant))
}

/// DELETE /api/events/{eventId}/participants/{profileId}
///
/// Leaving vacates any held seat. Leaving an event never joined succeeds.
pub async fn leave_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((event_id, profile_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let id = event_id.clone();
    let departed = with_conn(&state.pool, move |conn| {
        let row_id = match get_participant(conn, &id, &profile_id) {
            Ok(participant) => Some(participant.id),
            Err(plenum_store::StoreError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        leave_event(conn, &id, &profile_id)?;
        Ok(row_id)
    })
    .await?;

    if let Some(row_id) = departed {
        publish_change(
            &state,
            &event_id,
            StoreTable::EventParticipants,
            ChangeOp::Delete,
            &row_id,
        );
    }
    Ok(Json(json!({ "status": "left" })))
}
