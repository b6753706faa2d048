use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Account row. `id` is the auth service's subject id and never changes;
/// email/name/avatar are refreshed on every sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row per sign-in. IP and user agent are informational capture only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserSessionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}
