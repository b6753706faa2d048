use std::sync::Arc;

use sqlx::PgPool;

use crate::auth::TokenVerifier;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: LlmClient,
    /// Pluggable token verification. Production wires the hosted auth
    /// service client; router tests swap in a static verifier.
    pub auth: Arc<dyn TokenVerifier>,
}
