//! Question records and the moderation lifecycle.

use crate::{new_record_id, StoreError};
use plenum_types::QuestionStatus;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A submitted item of audience input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    /// Public record id.
    pub id: String,
    pub event_id: String,
    /// Profile id of the submitter.
    pub participant_id: String,
    pub content: String,
    pub language: Option<String>,
    pub status: QuestionStatus,
    pub priority: Option<i64>,
    pub cluster_id: Option<String>,
    /// Whether a generated voice answered this question.
    pub ai_voice_used: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Parameters for submitting a new question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestionParams {
    pub event_id: String,
    pub participant_id: String,
    pub content: String,
    pub language: Option<String>,
}

/// Creates a question in `pending` status and returns the stored record.
pub fn create_question(
    conn: &Connection,
    params: &CreateQuestionParams,
) -> Result<Question, StoreError> {
    let id = new_record_id();
    let question = conn.query_row(
        "INSERT INTO questions (id, event_id, participant_id, content, language)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, event_id, participant_id, content, language, status,
                   priority, cluster_id, ai_voice_used, created_at, updated_at",
        params![
            id,
            params.event_id,
            params.participant_id,
            params.content,
            params.language,
        ],
        map_row_to_question,
    )?;
    Ok(question)
}

/// Retrieves a question by its record id.
pub fn get_question(conn: &Connection, id: &str) -> Result<Question, StoreError> {
    conn.query_row(
        "SELECT id, event_id, participant_id, content, language, status,
                priority, cluster_id, ai_voice_used, created_at, updated_at
         FROM questions WHERE id = ?1",
        [id],
        map_row_to_question,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("question {id}")))
}

/// Lists questions for an event, newest first, optionally filtered by status.
///
/// `limit` defaults to 50 and is capped at 200.
pub fn list_questions(
    conn: &Connection,
    event_id: &str,
    status: Option<QuestionStatus>,
    limit: Option<u32>,
) -> Result<Vec<Question>, StoreError> {
    let limit = limit.unwrap_or(50).min(200);

    let sql = if status.is_some() {
        format!(
            "SELECT id, event_id, participant_id, content, language, status,
                    priority, cluster_id, ai_voice_used, created_at, updated_at
             FROM questions
             WHERE event_id = ?1 AND status = ?2
             ORDER BY created_at DESC
             LIMIT {limit}"
        )
    } else {
        format!(
            "SELECT id, event_id, participant_id, content, language, status,
                    priority, cluster_id, ai_voice_used, created_at, updated_at
             FROM questions
             WHERE event_id = ?1
             ORDER BY created_at DESC
             LIMIT {limit}"
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let rows = if let Some(status) = status {
        stmt.query_map(params![event_id, status.as_str()], map_row_to_question)?
    } else {
        stmt.query_map(params![event_id], map_row_to_question)?
    };

    let mut questions = Vec::new();
    for row in rows {
        questions.push(row?);
    }
    Ok(questions)
}

/// Moves a question along the moderation graph.
///
/// The update is a compare-and-set on the current status: if a concurrent
/// moderator got there first, the stored row is re-read and the transition is
/// re-validated against what actually happened. Terminal states never move.
pub fn update_question_status(
    conn: &Connection,
    id: &str,
    next: QuestionStatus,
) -> Result<Question, StoreError> {
    let current = get_question(conn, id)?;
    if !current.status.can_transition_to(next) {
        return Err(StoreError::InvalidTransition {
            from: current.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }

    let count = conn.execute(
        "UPDATE questions SET status = ?2, updated_at = datetime('now')
         WHERE id = ?1 AND status = ?3",
        params![id, next.as_str(), current.status.as_str()],
    )?;
    if count == 0 {
        let now = get_question(conn, id)?;
        return Err(StoreError::InvalidTransition {
            from: now.status.as_str().to_string(),
            to: next.as_str().to_string(),
        });
    }
    get_question(conn, id)
}

/// Marks whether a generated voice answered this question.
pub fn set_question_voice_used(
    conn: &Connection,
    id: &str,
    used: bool,
) -> Result<Question, StoreError> {
    let count = conn.execute(
        "UPDATE questions SET ai_voice_used = ?2, updated_at = datetime('now') WHERE id = ?1",
        params![id, used],
    )?;
    if count == 0 {
        return Err(StoreError::NotFound(format!("question {id}")));
    }
    get_question(conn, id)
}

/// Deletes a question. Moderators may delete at any status, terminal or not.
pub fn delete_question(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let count = conn.execute("DELETE FROM questions WHERE id = ?1", [id])?;
    if count == 0 {
        return Err(StoreError::NotFound(format!("question {id}")));
    }
    Ok(())
}

fn map_row_to_question(row: &Row) -> rusqlite::Result<Question> {
    let status_str: String = row.get(5)?;
    let status = QuestionStatus::parse(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Question {
        id: row.get(0)?,
        event_id: row.get(1)?,
        participant_id: row.get(2)?,
        content: row.get(3)?,
        language: row.get(4)?,
        status,
        priority: row.get(6)?,
        cluster_id: row.get(7)?,
        ai_voice_used: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}
