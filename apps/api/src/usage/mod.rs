pub mod handlers;
pub mod tracking;

use serde::Serialize;

/// Anonymous clients get exactly one free generation per ip + user agent.
/// Hardcoded to keep the limit honest across deployments.
pub const MAX_ANONYMOUS_PROMPTS: i32 = 1;

/// Effectively unlimited. Kept as a number so the usage payload has the
/// same shape for both caller kinds.
pub const AUTHENTICATED_ALLOWANCE: i32 = 999_999;

/// Snapshot of what the caller is still allowed to do.
#[derive(Debug, Clone, Serialize)]
pub struct UsageLimit {
    pub can_generate: bool,
    pub prompts_used: i32,
    pub max_prompts: i32,
    pub remaining_prompts: i32,
    pub is_authenticated: bool,
}
