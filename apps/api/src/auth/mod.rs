pub mod handlers;
pub mod identity;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Verified identity
// ────────────────────────────────────────────────────────────────────────────

/// Identity attached to a request after token verification. Field values
/// come straight from the auth service's user record.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl AuthUser {
    /// Best available display name: profile name, then the local part of
    /// the email, then empty.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.full_name {
            if !name.trim().is_empty() {
                return name.trim().to_string();
            }
        }
        if let Some(email) = &self.email {
            if let Some(local) = email.split('@').next() {
                if !local.is_empty() {
                    return local.to_string();
                }
            }
        }
        String::new()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected by auth service")]
    InvalidToken,

    #[error("auth service error ({status}): {message}")]
    Service { status: u16, message: String },

    #[error("auth request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Seam for token verification so handlers can be tested without a live
/// auth service.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Hosted auth service client
// ────────────────────────────────────────────────────────────────────────────

const AUTH_TIMEOUT_SECS: u64 = 15;

/// Client for the hosted auth service. Tokens are opaque here; the service
/// owns validation and we only read back the user record.
pub struct AuthClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    id: Uuid,
    email: Option<String>,
    user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
    avatar_url: Option<String>,
}

impl AuthClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(AUTH_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url,
            api_key,
        }
    }

    /// Builds the user-info request. Header keys are plain strings since
    /// reqwest's header types differ from axum's.
    fn user_info_request(&self, token: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/user", self.base_url.trim_end_matches('/'));

        self.client
            .get(url)
            .header("authorization", format!("Bearer {token}"))
            .header("apikey", &self.api_key)
    }
}

#[async_trait]
impl TokenVerifier for AuthClient {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self.user_info_request(token).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let info: UserInfoResponse = response.json().await?;
        let metadata = info.user_metadata.unwrap_or(UserMetadata {
            full_name: None,
            avatar_url: None,
        });

        Ok(AuthUser {
            id: info.id,
            email: info.email,
            full_name: metadata.full_name,
            avatar_url: metadata.avatar_url,
        })
    }
}

/// Pulls the bearer token out of the Authorization header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(full_name: Option<&str>, email: Option<&str>) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: email.map(String::from),
            full_name: full_name.map(String::from),
            avatar_url: None,
        }
    }

    #[test]
    fn test_display_name_prefers_profile_name() {
        let u = user(Some("Ada Lovelace"), Some("ada@example.com"));
        assert_eq!(u.display_name(), "Ada Lovelace");
    }

    #[test]
    fn test_display_name_falls_back_to_email_local_part() {
        let u = user(None, Some("ada@example.com"));
        assert_eq!(u.display_name(), "ada");

        let blank = user(Some("   "), Some("ada@example.com"));
        assert_eq!(blank.display_name(), "ada");
    }

    #[test]
    fn test_display_name_empty_when_nothing_known() {
        let u = user(None, None);
        assert_eq!(u.display_name(), "");
    }

    #[test]
    fn test_user_info_request_carries_auth_headers() {
        let auth = AuthClient::new(
            "https://auth.example.com/auth/v1/".to_string(),
            "service-key".to_string(),
        );

        let request = auth.user_info_request("tok-123").build().unwrap();

        assert_eq!(
            request.url().as_str(),
            "https://auth.example.com/auth/v1/user"
        );
        assert_eq!(request.headers()["authorization"], "Bearer tok-123");
        assert_eq!(request.headers()["apikey"], "service-key");
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc123"),
        );
        assert_eq!(bearer_token(&headers), Some("abc123"));
    }

    #[test]
    fn test_bearer_token_missing_or_malformed() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        let mut basic = HeaderMap::new();
        basic.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic abc123"),
        );
        assert_eq!(bearer_token(&basic), None);

        let mut empty = HeaderMap::new();
        empty.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&empty), None);
    }
}
