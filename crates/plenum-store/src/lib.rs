//! Session state store for the Plenum platform.
//!
//! Implements the durable record layer behind a live Q&A session: profiles,
//! events, seats, participants, and questions, each with create/read/update/
//! delete operations over SQLite. Status-bearing records enforce their
//! transition graphs here, so no caller can move a question or participant
//! along an edge the lifecycle does not allow.
//!
//! Every operation is an independent write; there are no multi-table
//! transactions. Callers that need cross-record consistency re-query after a
//! change notification instead of trusting any local copy.

mod error;
mod events;
mod participants;
mod profiles;
mod questions;
mod seats;

pub use error::StoreError;
pub use events::{
    create_event, get_event, list_events_by_moderator, set_event_flags, update_event_status,
    CreateEventParams, Event,
};
pub use participants::{
    assign_seat, get_participant, join_event, leave_event, list_participants, set_mic_active,
    update_participant_status, Participant,
};
pub use profiles::{create_profile, find_profile_by_user, get_profile, CreateProfileParams, Profile};
pub use questions::{
    create_question, delete_question, get_question, list_questions, set_question_voice_used,
    update_question_status, CreateQuestionParams, Question,
};
pub use seats::{
    claim_seat, create_seats, get_seat, get_seat_by_token, list_seats, release_seat, Seat,
};

/// Generates a fresh public record id.
pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
