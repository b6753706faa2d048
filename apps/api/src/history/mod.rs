//! Prompt history: persistence after a completed stream, and the read
//! side the client polls.

pub mod handlers;

use anyhow::Result;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::generation::prompts::{build_title_prompt, TITLE_SYSTEM};
use crate::generation::stream::HistoryOwner;
use crate::llm_client::{ChatResponse, LlmClient, LlmError};
use crate::models::prompt::{PromptHistoryRow, PromptSummary};

const RECENT_LIMIT: i64 = 20;
const TITLE_MAX_CHARS: usize = 60;
const TITLE_FALLBACK_WORDS: usize = 8;

/// Saves one completed generation. The title comes from a second, small
/// LLM call; if that call fails the title is derived from the input so
/// the record is never dropped.
pub async fn save_prompt_history(
    db: &PgPool,
    llm: &LlmClient,
    owner: HistoryOwner,
    input: &str,
    output: &str,
) -> Result<Uuid> {
    let title = match generate_title(llm, input).await {
        Some(title) => title,
        None => derive_title(input),
    };

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO prompt_history (id, user_id, session_id, input_text, output_text, title)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(owner.user_id)
    .bind(owner.session_id)
    .bind(input)
    .bind(output)
    .bind(&title)
    .execute(db)
    .await?;

    info!(user_id = %owner.user_id, prompt_id = %id, "prompt history saved");
    Ok(id)
}

async fn generate_title(llm: &LlmClient, input: &str) -> Option<String> {
    let prompt = build_title_prompt(input);

    let result = llm
        .call(&prompt, TITLE_SYSTEM)
        .await
        .and_then(|response| title_from_response(&response));

    match result {
        Ok(title) => Some(title),
        Err(e) => {
            warn!("title generation failed, deriving title from input: {e}");
            None
        }
    }
}

/// Cleans the model's title, rejecting missing or blank content.
fn title_from_response(response: &ChatResponse) -> Result<String, LlmError> {
    let text = response.text().ok_or(LlmError::EmptyContent)?;
    let title = text.trim().trim_matches('"').to_string();

    if title.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    Ok(title)
}

/// Title from the input itself: the first few words, capped by characters.
fn derive_title(input: &str) -> String {
    let words: Vec<&str> = input
        .split_whitespace()
        .take(TITLE_FALLBACK_WORDS)
        .collect();
    let title: String = words.join(" ").chars().take(TITLE_MAX_CHARS).collect();

    if title.is_empty() {
        "Untitled prompt".to_string()
    } else {
        title
    }
}

/// Most recent saved prompt, id and timestamp only.
pub async fn latest_prompt(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Option<PromptSummary>, sqlx::Error> {
    sqlx::query_as::<_, PromptSummary>(
        r#"
        SELECT id, created_at FROM prompt_history
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// Full record, scoped to its owner. Another user's id returns `None`.
pub async fn prompt_by_id(
    db: &PgPool,
    user_id: Uuid,
    id: Uuid,
) -> Result<Option<PromptHistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, PromptHistoryRow>(
        "SELECT * FROM prompt_history WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(db)
    .await
}

/// Newest-first page of the user's history.
pub async fn recent_prompts(
    db: &PgPool,
    user_id: Uuid,
) -> Result<Vec<PromptHistoryRow>, sqlx::Error> {
    sqlx::query_as::<_, PromptHistoryRow>(
        r#"
        SELECT * FROM prompt_history
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(RECENT_LIMIT)
    .fetch_all(db)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{ChatChoice, ChatResponseMessage, ChatUsage};

    fn response_with(content: Option<&str>) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChatResponseMessage {
                    content: content.map(String::from),
                },
            }],
            usage: ChatUsage {
                prompt_tokens: 1,
                completion_tokens: 1,
            },
        }
    }

    #[test]
    fn test_title_from_response_strips_wrapping_quotes() {
        let response = response_with(Some("\"Rust Web Scraper\""));
        assert_eq!(title_from_response(&response).unwrap(), "Rust Web Scraper");
    }

    #[test]
    fn test_title_from_response_rejects_missing_or_blank_content() {
        let missing = ChatResponse {
            choices: vec![],
            usage: ChatUsage {
                prompt_tokens: 1,
                completion_tokens: 0,
            },
        };
        assert!(matches!(
            title_from_response(&missing),
            Err(LlmError::EmptyContent)
        ));

        let blank = response_with(Some("  \"\"  "));
        assert!(matches!(
            title_from_response(&blank),
            Err(LlmError::EmptyContent)
        ));
    }

    #[test]
    fn test_derive_title_takes_leading_words() {
        let title =
            derive_title("build a rust web scraper that collects pricing data nightly and stores it");
        assert_eq!(title, "build a rust web scraper that collects pricing");
    }

    #[test]
    fn test_derive_title_caps_characters() {
        let input = "supercalifragilistic expialidocious antidisestablishmentarianism \
                     floccinaucinihilipilification pseudopseudohypoparathyroidism";
        let title = derive_title(input);
        assert!(title.chars().count() <= TITLE_MAX_CHARS);
    }

    #[test]
    fn test_derive_title_handles_blank_input() {
        assert_eq!(derive_title("   "), "Untitled prompt");
    }
}
