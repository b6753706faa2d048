use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use tracing::warn;

use crate::auth::bearer_token;
use crate::errors::AppError;
use crate::state::AppState;
use crate::usage::{tracking, UsageLimit};

/// GET /api/v1/usage
///
/// Quota snapshot for whoever is asking. A bad or expired token does not
/// fail the lookup; the caller just sees the anonymous view and the client
/// can prompt for sign-in again.
pub async fn get_usage(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UsageLimit>, AppError> {
    if let Some(token) = bearer_token(&headers) {
        match state.auth.verify(token).await {
            Ok(_) => return Ok(Json(tracking::authenticated_usage())),
            Err(e) => {
                warn!("usage lookup with unverifiable token: {e}");
            }
        }
    }

    let ip = tracking::client_ip(&headers);
    let user_agent = tracking::user_agent(&headers);
    let session_identifier = tracking::anonymous_session_id(&ip, &user_agent);

    let usage = tracking::anonymous_usage(&state.db, &session_identifier).await?;
    Ok(Json(usage))
}
