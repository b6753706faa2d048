//! Anonymous quota enforcement. Callers without a token are identified by
//! a hash of ip + user agent; the counter row for that hash decides
//! whether another free generation is allowed.

use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::usage::UsageCounterRow;
use crate::usage::{UsageLimit, AUTHENTICATED_ALLOWANCE, MAX_ANONYMOUS_PROMPTS};

const FALLBACK_IP: &str = "127.0.0.1";
const FALLBACK_USER_AGENT: &str = "unknown";

/// Client IP as seen through common proxy headers. `x-forwarded-for`
/// carries a hop list; only the first entry is the client.
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    for name in ["x-real-ip", "cf-connecting-ip"] {
        if let Some(value) = header_str(headers, name) {
            let value = value.trim();
            if !value.is_empty() {
                return value.to_string();
            }
        }
    }

    FALLBACK_IP.to_string()
}

pub fn user_agent(headers: &HeaderMap) -> String {
    header_str(headers, "user-agent")
        .map(|ua| ua.trim())
        .filter(|ua| !ua.is_empty())
        .unwrap_or(FALLBACK_USER_AGENT)
        .to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Stable identifier for an anonymous client. Hashing keeps raw IPs out
/// of the usage table.
pub fn anonymous_session_id(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{ip}:{user_agent}"));
    format!("{:x}", hasher.finalize())
}

/// Current quota state for an anonymous client. A missing counter row
/// means the client has never generated.
pub async fn anonymous_usage(
    db: &PgPool,
    session_identifier: &str,
) -> Result<UsageLimit, sqlx::Error> {
    let counter = sqlx::query_as::<_, UsageCounterRow>(
        r#"
        SELECT * FROM usage_tracking
        WHERE session_identifier = $1
        "#,
    )
    .bind(session_identifier)
    .fetch_optional(db)
    .await?;

    let prompts_used = counter.map(|row| row.prompts_used).unwrap_or(0);

    Ok(UsageLimit {
        can_generate: prompts_used < MAX_ANONYMOUS_PROMPTS,
        prompts_used,
        max_prompts: MAX_ANONYMOUS_PROMPTS,
        remaining_prompts: (MAX_ANONYMOUS_PROMPTS - prompts_used).max(0),
        is_authenticated: false,
    })
}

/// Signed-in callers are never quota limited.
pub fn authenticated_usage() -> UsageLimit {
    UsageLimit {
        can_generate: true,
        prompts_used: 0,
        max_prompts: AUTHENTICATED_ALLOWANCE,
        remaining_prompts: AUTHENTICATED_ALLOWANCE,
        is_authenticated: true,
    }
}

/// Bumps the counter for an anonymous client, creating the row on first
/// use. Called once per accepted generation.
pub async fn record_anonymous_use(
    db: &PgPool,
    session_identifier: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO usage_tracking (id, session_identifier, prompts_used)
        VALUES ($1, $2, 1)
        ON CONFLICT (session_identifier) DO UPDATE
        SET prompts_used = usage_tracking.prompts_used + 1,
            updated_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_identifier)
    .execute(db)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_takes_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_through_proxy_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.9"));
        assert_eq!(client_ip(&headers), "198.51.100.9");

        let mut cf = HeaderMap::new();
        cf.insert("cf-connecting-ip", HeaderValue::from_static("192.0.2.4"));
        assert_eq!(client_ip(&cf), "192.0.2.4");

        let empty = HeaderMap::new();
        assert_eq!(client_ip(&empty), FALLBACK_IP);
    }

    #[test]
    fn test_user_agent_fallback() {
        let empty = HeaderMap::new();
        assert_eq!(user_agent(&empty), FALLBACK_USER_AGENT);

        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("test-browser/1.0"));
        assert_eq!(user_agent(&headers), "test-browser/1.0");
    }

    #[test]
    fn test_anonymous_session_id_is_stable_and_distinct() {
        let a = anonymous_session_id("203.0.113.7", "test-browser/1.0");
        let b = anonymous_session_id("203.0.113.7", "test-browser/1.0");
        let c = anonymous_session_id("203.0.113.8", "test-browser/1.0");
        let d = anonymous_session_id("203.0.113.7", "other-browser/2.0");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        // sha256 hex
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_authenticated_usage_is_unlimited() {
        let usage = authenticated_usage();
        assert!(usage.can_generate);
        assert!(usage.is_authenticated);
        assert_eq!(usage.remaining_prompts, AUTHENTICATED_ALLOWANCE);
    }
}
