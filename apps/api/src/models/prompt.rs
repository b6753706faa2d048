use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Saved generation. `output_text` is the full streamed transcript;
/// rows only exist for completed streams.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PromptHistoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
    pub input_text: String,
    pub output_text: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// Lightweight pointer used by the latest-prompt poll. The client fetches
/// the full row by id once it sees a fresh `created_at`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PromptSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}
