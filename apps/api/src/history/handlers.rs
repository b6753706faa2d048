//! Axum route handlers for reading prompt history. All of these require
//! a verified caller; there is no anonymous view of history.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use uuid::Uuid;

use crate::auth::{bearer_token, AuthUser};
use crate::errors::AppError;
use crate::history;
use crate::models::prompt::{PromptHistoryRow, PromptSummary};
use crate::state::AppState;

async fn require_user(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, AppError> {
    let token = bearer_token(headers).ok_or(AppError::Unauthorized)?;
    Ok(state.auth.verify(token).await?)
}

/// GET /api/v1/prompts/latest
///
/// Id and timestamp of the newest saved prompt. The client polls this
/// after a stream finishes to see when persistence has caught up.
pub async fn get_latest_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PromptSummary>, AppError> {
    let user = require_user(&state, &headers).await?;

    let summary = history::latest_prompt(&state.db, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No prompts saved yet".to_string()))?;

    Ok(Json(summary))
}

/// GET /api/v1/prompts/:id
///
/// Full saved record including input and output text.
pub async fn get_prompt(
    State(state): State<AppState>,
    Path(prompt_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<PromptHistoryRow>, AppError> {
    let user = require_user(&state, &headers).await?;

    let row = history::prompt_by_id(&state.db, user.id, prompt_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Prompt {prompt_id} not found")))?;

    Ok(Json(row))
}

/// GET /api/v1/prompts
///
/// The user's recent history, newest first.
pub async fn list_prompts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PromptHistoryRow>>, AppError> {
    let user = require_user(&state, &headers).await?;

    let rows = history::recent_prompts(&state.db, user.id).await?;
    Ok(Json(rows))
}
