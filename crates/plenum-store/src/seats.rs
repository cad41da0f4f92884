//! Seat records and the claim protocol.
//!
//! A seat claim is a conditional update on `occupied_by IS NULL`, so when two
//! participants race for the same seat exactly one assignment succeeds and
//! the loser sees `SeatOccupied`.

use crate::{new_record_id, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A claimable slot within an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    /// Public record id.
    pub id: String,
    pub event_id: String,
    pub seat_number: String,
    /// Join token encoded into the printed QR code.
    pub qr_token: String,
    /// Profile id of the current occupant, if any.
    pub occupied_by: Option<String>,
    pub created_at: String,
}

/// Creates a batch of seats at event setup, one per seat number.
///
/// Each seat gets a fresh join token. A repeated seat number within the
/// event fails with `DuplicateSeatNumber`; seats created before the failing
/// one are kept (each insert is an independent write).
pub fn create_seats(
    conn: &Connection,
    event_id: &str,
    seat_numbers: &[String],
) -> Result<Vec<Seat>, StoreError> {
    let mut seats = Vec::with_capacity(seat_numbers.len());
    for seat_number in seat_numbers {
        let id = new_record_id();
        let qr_token = new_record_id();
        let result = conn.query_row(
            "INSERT INTO event_seats (id, event_id, seat_number, qr_token)
             VALUES (?1, ?2, ?3, ?4)
             RETURNING id, event_id, seat_number, qr_token, occupied_by, created_at",
            params![id, event_id, seat_number, qr_token],
            map_row_to_seat,
        );
        match result {
            Ok(seat) => seats.push(seat),
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ffi::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::DuplicateSeatNumber {
                    event_id: event_id.to_string(),
                    seat_number: seat_number.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(seats)
}

/// Retrieves a seat by its record id.
pub fn get_seat(conn: &Connection, id: &str) -> Result<Seat, StoreError> {
    conn.query_row(
        "SELECT id, event_id, seat_number, qr_token, occupied_by, created_at
         FROM event_seats WHERE id = ?1",
        [id],
        map_row_to_seat,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("seat {id}")))
}

/// Resolves a scanned QR token to its seat.
pub fn get_seat_by_token(conn: &Connection, qr_token: &str) -> Result<Seat, StoreError> {
    conn.query_row(
        "SELECT id, event_id, seat_number, qr_token, occupied_by, created_at
         FROM event_seats WHERE qr_token = ?1",
        [qr_token],
        map_row_to_seat,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("seat token {qr_token}")))
}

/// Lists all seats for an event, ordered by seat number.
pub fn list_seats(conn: &Connection, event_id: &str) -> Result<Vec<Seat>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, event_id, seat_number, qr_token, occupied_by, created_at
         FROM event_seats WHERE event_id = ?1 ORDER BY seat_number ASC",
    )?;

    let rows = stmt.query_map([event_id], map_row_to_seat)?;
    let mut seats = Vec::new();
    for row in rows {
        seats.push(row?);
    }
    Ok(seats)
}

/// Claims a seat for a profile.
///
/// The update only fires while the seat is vacant; under concurrent claims
/// exactly one caller wins and the rest get `SeatOccupied`.
pub fn claim_seat(conn: &Connection, seat_id: &str, profile_id: &str) -> Result<Seat, StoreError> {
    let count = conn.execute(
        "UPDATE event_seats SET occupied_by = ?2
         WHERE id = ?1 AND occupied_by IS NULL",
        params![seat_id, profile_id],
    )?;
    if count == 0 {
        let seat = get_seat(conn, seat_id)?;
        return Err(StoreError::SeatOccupied(seat.id));
    }
    get_seat(conn, seat_id)
}

/// Vacates a seat held by a profile. Releasing a seat the profile does not
/// hold is a no-op.
pub fn release_seat(conn: &Connection, seat_id: &str, profile_id: &str) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE event_seats SET occupied_by = NULL
         WHERE id = ?1 AND occupied_by = ?2",
        params![seat_id, profile_id],
    )?;
    Ok(())
}

fn map_row_to_seat(row: &Row) -> rusqlite::Result<Seat> {
    Ok(Seat {
        id: row.get(0)?,
        event_id: row.get(1)?,
        seat_number: row.get(2)?,
        qr_token: row.get(3)?,
        occupied_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}
