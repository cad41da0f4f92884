//! Shared types, status graphs, and constants for the Plenum platform.
//!
//! This crate provides the foundational types used across all Plenum crates:
//! the status enums for events, participants, and questions (each carrying
//! its allowed transition graph), event feature flags, and the change
//! notification types exchanged between the store and the realtime hub.
//!
//! No crate in the workspace depends on anything *except* `plenum-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod notify;
pub use notify::{ChangeNotification, ChangeOp, StoreTable};

/// Error returned when parsing a status string from the database fails.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown status value: {0}")]
pub struct ParseStatusError(pub String);

/// Lifecycle status of an event.
///
/// Transitions are one-way: `draft → active → ended`. An ended event is never
/// reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Draft,
    Active,
    Ended,
}

impl EventStatus {
    /// Returns the database string for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Ended => "ended",
        }
    }

    /// Parses a database string into a status.
    pub fn parse(s: &str) -> Result<Self, ParseStatusError> {
        match s {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "ended" => Ok(Self::Ended),
            other => Err(ParseStatusError(other.to_string())),
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Active) | (Self::Active, Self::Ended)
        )
    }
}

/// Status of a participant within an event.
///
/// The transition graph is a DAG with one cycle through idle:
/// `idle ↔ hand_raised → approved → speaking → idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Idle,
    HandRaised,
    Approved,
    Speaking,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::HandRaised => "hand_raised",
            Self::Approved => "approved",
            Self::Speaking => "speaking",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseStatusError> {
        match s {
            "idle" => Ok(Self::Idle),
            "hand_raised" => Ok(Self::HandRaised),
            "approved" => Ok(Self::Approved),
            "speaking" => Ok(Self::Speaking),
            other => Err(ParseStatusError(other.to_string())),
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::HandRaised)
                | (Self::HandRaised, Self::Idle)
                | (Self::HandRaised, Self::Approved)
                | (Self::Approved, Self::Speaking)
                | (Self::Speaking, Self::Idle)
        )
    }
}

/// Moderation lifecycle status of a submitted question.
///
/// `answered` and `rejected` are terminal. A pending question may jump
/// straight to `answered` (the moderator's "mark answered" shortcut) or go
/// through the `approved → speaking → answered` path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    Pending,
    Approved,
    Speaking,
    Answered,
    Rejected,
}

impl QuestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Speaking => "speaking",
            Self::Answered => "answered",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ParseStatusError> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "speaking" => Ok(Self::Speaking),
            "answered" => Ok(Self::Answered),
            "rejected" => Ok(Self::Rejected),
            other => Err(ParseStatusError(other.to_string())),
        }
    }

    /// Whether this status accepts no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Answered | Self::Rejected)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Answered)
                | (Self::Approved, Self::Speaking)
                | (Self::Speaking, Self::Answered)
        )
    }
}

/// Per-event feature flags, toggled by the moderator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventFlags {
    /// Generated voice reads answers aloud for this event.
    pub ai_voice_enabled: bool,
    /// Similar questions are grouped into clusters.
    pub question_clustering_enabled: bool,
    /// Submitted questions are translated for the moderator.
    pub translation_enabled: bool,
}
