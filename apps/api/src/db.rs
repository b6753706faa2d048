use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

/// Creates and returns a PostgreSQL connection pool.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    info!("Connecting to PostgreSQL...");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Users are keyed by the auth service's subject id; rows are upserted on
/// every sign-in.
const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    email TEXT NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    avatar_url TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// One row per sign-in; IP/user-agent are informational capture only,
/// never consulted for authorization.
const CREATE_USER_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS user_sessions (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    user_agent TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Immutable after insert; at most one row per completed generation stream.
const CREATE_PROMPT_HISTORY: &str = r#"
CREATE TABLE IF NOT EXISTS prompt_history (
    id UUID PRIMARY KEY,
    user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    session_id UUID REFERENCES user_sessions(id) ON DELETE SET NULL,
    input_text TEXT NOT NULL,
    output_text TEXT NOT NULL,
    title TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Anonymous usage counters, keyed by the SHA-256 of ip:user-agent.
/// Authenticated callers never touch this table.
const CREATE_USAGE_TRACKING: &str = r#"
CREATE TABLE IF NOT EXISTS usage_tracking (
    id UUID PRIMARY KEY,
    session_identifier TEXT NOT NULL UNIQUE,
    prompts_used INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const CREATE_INDICES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_user_sessions_user_created
        ON user_sessions(user_id, created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_prompt_history_user_created
        ON prompt_history(user_id, created_at DESC)",
];

/// Runs all required schema setup. Safe to call at every startup (idempotent).
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    pool.execute(CREATE_USERS).await?;
    pool.execute(CREATE_USER_SESSIONS).await?;
    pool.execute(CREATE_PROMPT_HISTORY).await?;
    pool.execute(CREATE_USAGE_TRACKING).await?;

    for index in CREATE_INDICES {
        pool.execute(*index).await?;
    }

    info!("Database schema is up to date");
    Ok(())
}
