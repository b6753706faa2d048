use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::{bearer_token, identity};
use crate::errors::AppError;
use crate::models::user::UserRow;
use crate::state::AppState;
use crate::usage::tracking;

#[derive(Debug, Serialize)]
pub struct SessionRegistration {
    pub user: UserRow,
    pub session_id: Uuid,
}

/// POST /api/v1/auth/session
///
/// Called by the client right after sign-in. Verifies the bearer token,
/// mirrors the identity locally and opens a session row.
pub async fn register_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SessionRegistration>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let identity_user = state.auth.verify(token).await?;

    let user = identity::upsert_user(&state.db, &identity_user).await?;

    let user_agent = tracking::user_agent(&headers);
    let ip_address = tracking::client_ip(&headers);
    let session_id = identity::open_session(&state.db, user.id, &user_agent, &ip_address).await?;

    info!(user_id = %user.id, session_id = %session_id, "session registered");

    Ok(Json(SessionRegistration { user, session_id }))
}
