//! Event records and their one-way lifecycle.

use crate::{new_record_id, StoreError};
use plenum_types::{EventFlags, EventStatus};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// One moderated Q&A session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Public record id.
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    /// Profile id of the moderator. Immutable after creation.
    pub moderator_id: String,
    pub max_participants: u32,
    pub status: EventStatus,
    pub flags: EventFlags,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for creating a new event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventParams {
    pub title: String,
    pub description: Option<String>,
    pub moderator_id: String,
    pub max_participants: u32,
    /// Initial status. The dashboard creates events directly as `active`;
    /// `draft` is the staging default.
    pub status: EventStatus,
    pub flags: EventFlags,
}

/// Creates a new event and returns the stored record.
pub fn create_event(conn: &Connection, params: &CreateEventParams) -> Result<Event, StoreError> {
    let id = new_record_id();
    let event = conn.query_row(
        "INSERT INTO events (
            id, title, description, moderator_id, max_participants, status,
            ai_voice_enabled, question_clustering_enabled, translation_enabled
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id, title, description, moderator_id, max_participants, status,
                  ai_voice_enabled, question_clustering_enabled, translation_enabled,
                  created_at, updated_at",
        params![
            id,
            params.title,
            params.description,
            params.moderator_id,
            params.max_participants,
            params.status.as_str(),
            params.flags.ai_voice_enabled,
            params.flags.question_clustering_enabled,
            params.flags.translation_enabled,
        ],
        map_row_to_event,
    )?;
    Ok(event)
}

/// Retrieves an event by its record id.
pub fn get_event(conn: &Connection, id: &str) -> Result<Event, StoreError> {
    conn.query_row(
        "SELECT id, title, description, moderator_id, max_participants, status,
                ai_voice_enabled, question_clustering_enabled, translation_enabled,
                created_at, updated_at
         FROM events WHERE id = ?1",
        [id],
        map_row_to_event,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("event {id}")))
}

/// Lists all events owned by a moderator, newest first.
pub fn list_events_by_moderator(
    conn: &Connection,
    moderator_id: &str,
) -> Result<Vec<Event>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, moderator_id, max_participants, status,
                ai_voice_enabled, question_clustering_enabled, translation_enabled,
                created_at, updated_at
         FROM events WHERE moderator_id = ?1 ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map([moderator_id], map_row_to_event)?;
    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }
    Ok(events)
}

/// Moves an event along its lifecycle.
///
/// Uses a compare-and-set on the current status so a concurrent writer cannot
/// sneak an event through an edge the graph does not allow.
pub fn update_event_status(
    conn: &Connection,
    id: &str,
    next: EventStatus,
) -> Result<Event, StoreError> {
    let current = get_event(conn, id)?;
    if !current.status.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            from: current.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    let count = conn.execute(
        "UPDATE events SET status = ?2, updated_at = datetime('now')
         WHERE id = ?1 AND status = ?3",
        params![id, next.as_str(), current.status.as_str()],
    )?;
    if count == 0 {
        // Lost the race; re-read so the error reflects what actually happened.
        let now = get_event(conn, id)?;
        return Err(StoreError::InvalidTransition {
            from: now.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }
    get_event(conn, id)
}

/// Replaces an event's feature flags.
pub fn set_event_flags(
    conn: &Connection,
    id: &str,
    flags: EventFlags,
) -> Result<Event, StoreError> {
    let count = conn.execute(
        "UPDATE events SET ai_voice_enabled = ?2, question_clustering_enabled = ?3,
                translation_enabled = ?4, updated_at = datetime('now')
         WHERE id = ?1",
        params![
            id,
            flags.ai_voice_enabled,
            flags.question_clustering_enabled,
            flags.translation_enabled,
        ],
    )?;
    if count == 0 {
        return Err(StoreError::NotFound(format!("event {id}")));
    }
    get_event(conn, id)
}

fn map_row_to_event(row: &Row) -> rusqlite::Result<Event> {
    let status_str: String = row.get(5)?;
    let status = EventStatus::parse(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        moderator_id: row.get(3)?,
        max_participants: row.get(4)?,
        status,
        flags: EventFlags {
            ai_voice_enabled: row.get(6)?,
            question_clustering_enabled: row.get(7)?,
            translation_enabled: row.get(8)?,
        },
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
