use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("record not found: {0}")]
    NotFound(String),

    /// The requested status change is not an edge of the lifecycle graph.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// A concurrent claimant already holds the seat.
    #[error("seat already occupied: {0}")]
    SeatOccupied(String),

    /// Seat numbers are unique within an event.
    #[error("duplicate seat number {seat_number} in event {event_id}")]
    DuplicateSeatNumber {
        event_id: String,
        seat_number: String,
    },
}

impl StoreError {
    /// Whether the underlying cause is a SQLite uniqueness/constraint failure.
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            StoreError::Database(rusqlite::Error::SqliteFailure(code, _)) => {
                code.code == rusqlite::ffi::ErrorCode::ConstraintViolation
            }
            StoreError::SeatOccupied(_) | StoreError::DuplicateSeatNumber { .. } => true,
            _ => false,
        }
    }
}
