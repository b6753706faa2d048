//! Local mirror of auth service identities. The auth service owns
//! credentials; we keep a row per user so history has a stable owner.

use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::models::user::{UserRow, UserSessionRow};

/// Inserts or refreshes the local user row for a verified identity.
/// Profile fields are overwritten on every call so stale names and
/// avatars self-correct at next sign-in.
pub async fn upsert_user(db: &PgPool, identity: &AuthUser) -> Result<UserRow, sqlx::Error> {
    let email = identity.email.clone().unwrap_or_default();
    let name = identity.display_name();

    let row = sqlx::query_as::<_, UserRow>(
        r#"
        INSERT INTO users (id, email, name, avatar_url)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET email = EXCLUDED.email,
            name = EXCLUDED.name,
            avatar_url = EXCLUDED.avatar_url,
            updated_at = now()
        RETURNING *
        "#,
    )
    .bind(identity.id)
    .bind(&email)
    .bind(&name)
    .bind(&identity.avatar_url)
    .fetch_one(db)
    .await?;

    debug!(user_id = %row.id, "user record upserted");
    Ok(row)
}

/// Records a fresh sign-in session for a user.
pub async fn open_session(
    db: &PgPool,
    user_id: Uuid,
    user_agent: &str,
    ip_address: &str,
) -> Result<Uuid, sqlx::Error> {
    let session_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO user_sessions (id, user_id, user_agent, ip_address)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .bind(user_agent)
    .bind(ip_address)
    .execute(db)
    .await?;

    Ok(session_id)
}

/// Finds the user's most recent session and refreshes its client details,
/// creating one if the user has never registered a session. Used by the
/// generate path so history rows can point at a session.
pub async fn touch_session(
    db: &PgPool,
    user_id: Uuid,
    user_agent: &str,
    ip_address: &str,
) -> Result<Uuid, sqlx::Error> {
    let existing = sqlx::query_as::<_, UserSessionRow>(
        r#"
        SELECT * FROM user_sessions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    match existing {
        Some(session) => {
            sqlx::query(
                r#"
                UPDATE user_sessions
                SET user_agent = $2, ip_address = $3
                WHERE id = $1
                "#,
            )
            .bind(session.id)
            .bind(user_agent)
            .bind(ip_address)
            .execute(db)
            .await?;

            Ok(session.id)
        }
        None => open_session(db, user_id, user_agent, ip_address).await,
    }
}
