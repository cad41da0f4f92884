//! Participant records within an event.
//!
//! Joins are idempotent: the `(event_id, participant_id)` unique pair means
//! concurrent join attempts converge on a single row.

use crate::{claim_seat, get_event, new_record_id, release_seat, StoreError};
use plenum_types::ParticipantStatus;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A joined identity within an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    /// Public record id.
    pub id: String,
    pub event_id: String,
    /// Profile id of the joined identity.
    pub participant_id: String,
    /// Seat held by this participant, if any.
    pub seat_id: Option<String>,
    pub mic_active: bool,
    pub status: ParticipantStatus,
    pub joined_at: String,
}

/// Joins a profile to an event, or returns the existing row if already joined.
pub fn join_event(
    conn: &Connection,
    event_id: &str,
    profile_id: &str,
) -> Result<Participant, StoreError> {
    // Verify the event exists first so a bad id surfaces as NotFound rather
    // than a foreign-key failure.
    let _ = get_event(conn, event_id)?;

    let id = new_record_id();
    conn.execute(
        "INSERT OR IGNORE INTO event_participants (id, event_id, participant_id)
         VALUES (?1, ?2, ?3)",
        params![id, event_id, profile_id],
    )?;

    get_participant(conn, event_id, profile_id)
}

/// Retrieves the participant row for a profile within an event.
pub fn get_participant(
    conn: &Connection,
    event_id: &str,
    profile_id: &str,
) -> Result<Participant, StoreError> {
    conn.query_row(
        "SELECT id, event_id, participant_id, seat_id, mic_active, status, joined_at
         FROM event_participants WHERE event_id = ?1 AND participant_id = ?2",
        [event_id, profile_id],
        map_row_to_participant,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("participant {profile_id} in event {event_id}")))
}

/// Lists all participants of an event, in join order.
pub fn list_participants(conn: &Connection, event_id: &str) -> Result<Vec<Participant>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, event_id, participant_id, seat_id, mic_active, status, joined_at
         FROM event_participants WHERE event_id = ?1 ORDER BY joined_at ASC",
    )?;

    let rows = stmt.query_map([event_id], map_row_to_participant)?;
    let mut participants = Vec::new();
    for row in rows {
        participants.push(row?);
    }
    Ok(participants)
}

/// Moves a participant along the hand-raise/approval graph.
///
/// Compare-and-set on the current status, as with question transitions.
pub fn update_participant_status(
    conn: &Connection,
    participant_row_id: &str,
    next: ParticipantStatus,
) -> Result<Participant, StoreError> {
    let current = get_participant_by_row_id(conn, participant_row_id)?;
    if !current.status.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            from: current.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    let count = conn.execute(
        "UPDATE event_participants SET status = ?2
         WHERE id = ?1 AND status = ?3",
        params![participant_row_id, next.as_str(), current.status.as_str()],
    )?;
    if count == 0 {
        let now = get_participant_by_row_id(conn, participant_row_id)?;
        return Err(StoreError::InvalidTransition {
            from: now.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }
    get_participant_by_row_id(conn, participant_row_id)
}

/// Sets the microphone flag on a participant row.
pub fn set_mic_active(
    conn: &Connection,
    participant_row_id: &str,
    active: bool,
) -> Result<Participant, StoreError> {
    let count = conn.execute(
        "UPDATE event_participants SET mic_active = ?2 WHERE id = ?1",
        params![participant_row_id, active],
    )?;
    if count == 0 {
        return Err(StoreError::NotFound(format!(
            "participant row {participant_row_id}"
        )));
    }
    get_participant_by_row_id(conn, participant_row_id)
}

/// Claims a seat and records it on the participant row.
///
/// Two independent writes, not a transaction: if the seat claim wins but the
/// row update fails, the caller surfaces the error and the participant can
/// retry or release. The claim itself is what guarantees single occupancy.
pub fn assign_seat(
    conn: &Connection,
    participant_row_id: &str,
    seat_id: &str,
) -> Result<Participant, StoreError> {
    let participant = get_participant_by_row_id(conn, participant_row_id)?;
    claim_seat(conn, seat_id, &participant.participant_id)?;

    conn.execute(
        "UPDATE event_participants SET seat_id = ?2 WHERE id = ?1",
        params![participant_row_id, seat_id],
    )?;
    get_participant_by_row_id(conn, participant_row_id)
}

/// Removes a participant from an event, vacating any held seat first.
pub fn leave_event(
    conn: &Connection,
    event_id: &str,
    profile_id: &str,
) -> Result<(), StoreError> {
    let participant = match get_participant(conn, event_id, profile_id) {
        Ok(p) => p,
        // Leaving an event never joined is idempotent.
        Err(StoreError::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };

    if let Some(seat_id) = &participant.seat_id {
        release_seat(conn, seat_id, profile_id)?;
    }

    conn.execute(
        "DELETE FROM event_participants WHERE id = ?1",
        [&participant.id],
    )?;
    Ok(())
}

fn get_participant_by_row_id(conn: &Connection, id: &str) -> Result<Participant, StoreError> {
    conn.query_row(
        "SELECT id, event_id, participant_id, seat_id, mic_active, status, joined_at
         FROM event_participants WHERE id = ?1",
        [id],
        map_row_to_participant,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("participant row {id}")))
}

fn map_row_to_participant(row: &Row) -> rusqlite::Result<Participant> {
    let status_str: String = row.get(5)?;
    let status = ParticipantStatus::parse(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Participant {
        id: row.get(0)?,
        event_id: row.get(1)?,
        participant_id: row.get(2)?,
        seat_id: row.get(3)?,
        mic_active: row.get(4)?,
        status,
        joined_at: row.get(6)?,
    })
}
