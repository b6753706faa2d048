use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-client counter for anonymous generations. `session_identifier` is
/// the sha256 of ip + user agent, unique per row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageCounterRow {
    pub id: Uuid,
    pub session_identifier: String,
    pub prompts_used: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
