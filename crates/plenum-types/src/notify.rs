//! Change notification types exchanged between the store and the realtime hub.
//!
//! A notification carries only "something matching this filter changed":
//! table, operation, and record id. It never carries the record payload, so
//! consumers must re-query the store to learn the new value.

use serde::{Deserialize, Serialize};

/// The tables a client can observe for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreTable {
    Events,
    EventSeats,
    EventParticipants,
    Questions,
}

impl StoreTable {
    /// Returns the database table name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::EventSeats => "event_seats",
            Self::EventParticipants => "event_participants",
            Self::Questions => "questions",
        }
    }
}

/// The kind of write that produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A payload-free change signal scoped to one event's channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub table: StoreTable,
    pub op: ChangeOp,
    /// Public id of the affected record.
    pub record_id: String,
}

impl ChangeNotification {
    pub fn new(table: StoreTable, op: ChangeOp, record_id: impl Into<String>) -> Self {
        Self {
            table,
            op,
            record_id: record_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_match_schema() {
        assert_eq!(StoreTable::Events.as_str(), "events");
        assert_eq!(StoreTable::EventSeats.as_str(), "event_seats");
        assert_eq!(StoreTable::EventParticipants.as_str(), "event_participants");
        assert_eq!(StoreTable::Questions.as_str(), "questions");
    }

    #[test]
    fn notification_serialization_round_trip() {
        let n = ChangeNotification::new(StoreTable::Questions, ChangeOp::Insert, "q-1");
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"questions\""));
        assert!(json.contains("\"insert\""));
        let back: ChangeNotification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }
}
