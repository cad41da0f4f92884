//! Question handlers.

use crate::{publish_change, with_conn, AppState};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use plenum_store::{
    create_question, delete_question, find_profile_by_user, get_question, list_questions,
    set_question_voice_used, update_question_status, CreateQuestionParams, Question,
};
use plenum_types::{ChangeOp, QuestionStatus, StoreTable};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Maximum length for question content.
const MAX_CONTENT_LEN: usize = 4096;

#[derive(Deserialize)]
pub struct CreateQuestionRequest {
    /// Authenticated user submitting the question. The profile is resolved
    /// first; submission never proceeds for an unknown identity.
    pub user_id: String,
    pub content: String,
    pub language: Option<String>,
}

#[derive(Deserialize)]
pub struct ListQuestionsParams {
    pub status: Option<QuestionStatus>,
    pub limit: Option<u32>,
}

#[derive(Deserialize)]
pub struct UpdateQuestionRequest {
    pub status: Option<QuestionStatus>,
    pub ai_voice_used: Option<bool>,
}

/// POST /api/events/{eventId}/questions
pub async fn create_question_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<Json<Question>, StatusCode> {
    let content = payload.content.trim().to_string();
    if content.is_empty() || content.len() > MAX_CONTENT_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = event_id.clone();
    let question = with_conn(&state.pool, move |conn| {
        let profile = find_profile_by_user(conn, &payload.user_id)?;
        create_question(
            conn,
            &CreateQuestionParams {
                event_id: id,
                participant_id: profile.id,
                content,
                language: payload.language,
            },
        )
    })
    .await?;

    publish_change(
        &state,
        &event_id,
        StoreTable::Questions,
        ChangeOp::Insert,
        &question.id,
    );
    Ok(Json(question))
}

/// GET /api/events/{eventId}/questions?status=…&limit=…
pub async fn list_questions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(event_id): Path<String>,
    Query(params): Query<ListQuestionsParams>,
) -> Result<Json<Vec<Question>>, StatusCode> {
    let questions = with_conn(&state.pool, move |conn| {
        list_questions(conn, &event_id, params.status, params.limit)
    })
    .await?;
    Ok(Json(questions))
}

/// PATCH /api/questions/{questionId}
///
/// Moves a question along the moderation graph or flags voice usage.
/// Transitions the graph does not allow come back as 409.
pub async fn update_question_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(question_id): Path<String>,
    Json(payload): Json<UpdateQuestionRequest>,
) -> Result<Json<Question>, StatusCode> {
    if payload.status.is_none() && payload.ai_voice_used.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = question_id.clone();
    let question = with_conn(&state.pool, move |conn| {
        let mut question = get_question(conn, &id)?;
        if let Some(status) = payload.status {
            question = update_question_status(conn, &id, status)?;
        }
        if let Some(used) = payload.ai_voice_used {
            question = set_question_voice_used(conn, &id, used)?;
        }
        Ok(question)
    })
    .await?;

    publish_change(
        &state,
        &question.event_id,
        StoreTable::Questions,
        ChangeOp::Update,
        &question.id,
    );
    Ok(Json(question))
}

/// DELETE /api/questions/{questionId}
pub async fn delete_question_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(question_id): Path<String>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let id = question_id.clone();
    let event_id = with_conn(&state.pool, move |conn| {
        let question = get_question(conn, &id)?;
        delete_question(conn, &id)?;
        Ok(question.event_id)
    })
    .await?;

    publish_change(
        &state,
        &event_id,
        StoreTable::Questions,
        ChangeOp::Delete,
        &question_id,
    );
    Ok(Json(json!({ "status": "deleted" })))
}
