//! Axum route handlers for the prompt generation API.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::auth::{bearer_token, identity};
use crate::errors::{AppError, AppJson};
use crate::generation::prompts::{build_meta_prompt, GENERATION_SYSTEM};
use crate::generation::stream::{start_relay, HistoryOwner};
use crate::state::AppState;
use crate::usage::tracking;

/// Upper bound on the user's idea text, counted after trimming.
pub const MAX_INPUT_CHARS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct GeneratePromptRequest {
    pub input: String,
}

/// POST /api/v1/prompts/generate
///
/// Turns a short idea into a structured prompt, streamed back as plain
/// text. Anonymous callers spend their single free generation here;
/// signed-in callers get the result saved to history once the stream
/// completes.
pub async fn handle_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(request): AppJson<GeneratePromptRequest>,
) -> Result<Response, AppError> {
    let input = request.input.trim().to_string();

    if input.is_empty() {
        return Err(AppError::Validation(
            "Input is required and must be a non-empty string".to_string(),
        ));
    }
    if input.chars().count() > MAX_INPUT_CHARS {
        return Err(AppError::Validation(
            "Input is too long. Please keep it under 2000 characters.".to_string(),
        ));
    }

    // Resolve the caller before anything reaches the LLM. A token that
    // fails verification is a hard 401, not a silent anonymous downgrade.
    let identity_user = match bearer_token(&headers) {
        Some(token) => Some(state.auth.verify(token).await?),
        None => None,
    };

    let ip = tracking::client_ip(&headers);
    let user_agent = tracking::user_agent(&headers);

    let mut anonymous_id: Option<String> = None;
    let mut owner: Option<HistoryOwner> = None;

    match &identity_user {
        Some(user) => {
            // The user row must exist before history can point at it.
            let user_row = identity::upsert_user(&state.db, user).await?;

            let session_id =
                match identity::touch_session(&state.db, user_row.id, &user_agent, &ip).await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        // History survives without a session pointer.
                        warn!(user_id = %user_row.id, "failed to touch session: {e}");
                        None
                    }
                };

            owner = Some(HistoryOwner {
                user_id: user_row.id,
                session_id,
            });
        }
        None => {
            let session_identifier = tracking::anonymous_session_id(&ip, &user_agent);
            let usage = tracking::anonymous_usage(&state.db, &session_identifier).await?;

            if !usage.can_generate {
                return Err(AppError::UsageLimit(
                    "Free prompt limit reached. Sign in to continue.".to_string(),
                ));
            }

            anonymous_id = Some(session_identifier);
        }
    }

    let meta_prompt = build_meta_prompt(&input);
    let deltas = state
        .llm
        .stream(&meta_prompt, GENERATION_SYSTEM)
        .await
        .map_err(|e| AppError::Llm(e.to_string()))?;

    // The free generation is spent once the upstream stream is open.
    if let Some(session_identifier) = &anonymous_id {
        if let Err(e) = tracking::record_anonymous_use(&state.db, session_identifier).await {
            error!("failed to record anonymous usage: {e}");
        }
    }

    info!(
        authenticated = identity_user.is_some(),
        input_chars = input.chars().count(),
        "prompt generation started"
    );

    let body = start_relay(state.db.clone(), state.llm.clone(), deltas, input, owner);

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}
