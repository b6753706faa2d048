/// LLM client — the single point of entry for all model calls in the API.
///
/// ARCHITECTURAL RULE: No other module may call the completions API directly.
/// All LLM interactions MUST go through this module.
///
/// Model: gpt-4o-mini (hardcoded — do not make configurable to prevent drift)
use anyhow::Result;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;
use tracing::{debug, warn};

/// The model used for all LLM calls in the API.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 1500;
const TEMPERATURE: f32 = 0.7;
const MAX_RETRIES: u32 = 3;

/// Incremental output from a streamed completion.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Extracts the assistant text from the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: ChunkDelta,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// One parsed server-sent event from a streamed completion.
#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// The single LLM client used by all services in the API.
/// Wraps the OpenAI chat completions API with retry logic and streaming.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
            base_url,
        }
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Makes a blocking call to the completions API, returning the full
    /// response. Retries on 429 (rate limit) and 5xx errors with
    /// exponential backoff.
    pub async fn call(&self, prompt: &str, system: &str) -> Result<ChatResponse, LlmError> {
        let request_body = ChatRequest {
            model: MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: false,
        };

        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(self.completions_url())
                .bearer_auth(&self.api_key)
                .header("content-type", "application/json")
                .json(&request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                // Try to parse error message
                let message = serde_json::from_str::<OpenAiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let chat_response: ChatResponse = response.json().await?;

            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                chat_response.usage.prompt_tokens, chat_response.usage.completion_tokens
            );

            return Ok(chat_response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    /// Opens a streamed completion and returns the text deltas as they
    /// arrive. The request itself is not retried; by the time a stream
    /// fails the caller may already have forwarded partial output.
    pub async fn stream(&self, prompt: &str, system: &str) -> Result<DeltaStream, LlmError> {
        let request_body = ChatRequest {
            model: MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream: true,
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(delta_stream(response.bytes_stream()))
    }
}

/// Converts the raw SSE byte stream into text deltas. Bytes are buffered
/// until a full newline-terminated line has arrived; a chunk boundary may
/// fall anywhere, including inside a multi-byte character.
fn delta_stream(
    bytes: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
) -> DeltaStream {
    let deltas = async_stream::try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        while let Some(chunk) = bytes.next().await {
            let chunk = chunk?;
            buffer.extend_from_slice(&chunk);

            // Events are newline-delimited; a chunk may carry several
            // or end mid-line.
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();

                match parse_sse_line(&String::from_utf8_lossy(&line)) {
                    Some(SseEvent::Delta(text)) => yield text,
                    Some(SseEvent::Done) => {
                        finished = true;
                        break;
                    }
                    None => {}
                }
            }

            if finished {
                break;
            }
        }

        if !finished {
            let tail = String::from_utf8_lossy(&buffer);
            if let Some(SseEvent::Delta(text)) = parse_sse_line(tail.trim()) {
                yield text;
            }
        }
    };

    Box::pin(deltas)
}

/// Parses one SSE line from the completions stream. Returns `None` for
/// blank lines, comments and malformed payloads so the stream skips them.
fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let payload = line.trim().strip_prefix("data:")?.trim();

    if payload == "[DONE]" {
        return Some(SseEvent::Done);
    }
    if payload.is_empty() {
        return None;
    }

    let chunk: ChatChunk = serde_json::from_str(payload).ok()?;
    let text = chunk.choices.into_iter().next()?.delta.content?;
    if text.is_empty() {
        return None;
    }

    Some(SseEvent::Delta(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line_extracts_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(
            parse_sse_line(line),
            Some(SseEvent::Delta("Hello".to_string()))
        );
    }

    #[test]
    fn test_parse_sse_line_done_sentinel() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done));
        assert_eq!(parse_sse_line("data:[DONE]"), Some(SseEvent::Done));
    }

    #[test]
    fn test_parse_sse_line_skips_noise() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: ping"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
    }

    #[test]
    fn test_parse_sse_line_skips_empty_delta() {
        // First chunk usually carries only the role, no content.
        let role_only = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(role_only), None);

        let empty = r#"data: {"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_sse_line(empty), None);
    }

    #[test]
    fn test_chat_response_text() {
        let json = r#"{
            "choices": [{"message": {"role": "assistant", "content": "result"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), Some("result"));
    }

    /// Runs `delta_stream` over a fixed sequence of network chunks.
    async fn collect_deltas(parts: Vec<&'static [u8]>) -> Vec<String> {
        let chunks = parts
            .into_iter()
            .map(|part| Ok::<_, reqwest::Error>(Bytes::from_static(part)));
        let mut deltas = delta_stream(futures::stream::iter(chunks));

        let mut out = Vec::new();
        while let Some(delta) = deltas.next().await {
            out.push(delta.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_delta_stream_reassembles_event_split_across_chunks() {
        let deltas = collect_deltas(vec![
            b"data: {\"choices\":[{\"del",
            b"ta\":{\"content\":\"Hello\"}}]}\ndata: [DONE]\n",
        ])
        .await;

        assert_eq!(deltas, vec!["Hello"]);
    }

    #[tokio::test]
    async fn test_delta_stream_keeps_multibyte_char_split_across_chunks() {
        // The boundary lands between the two bytes of the é.
        let event = "data: {\"choices\":[{\"delta\":{\"content\":\"café\"}}]}\n";
        let split = event.find('é').unwrap() + 1;
        let (head, tail) = event.as_bytes().split_at(split);

        let deltas = collect_deltas(vec![head, tail, b"data: [DONE]\n"]).await;

        assert_eq!(deltas, vec!["café"]);
    }

    #[tokio::test]
    async fn test_delta_stream_stops_at_done() {
        let deltas = collect_deltas(vec![
            b"data: {\"choices\":[{\"delta\":{\"content\":\"one \"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"two\"}}]}\ndata: [DONE]\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n",
        ])
        .await;

        assert_eq!(deltas, vec!["one ", "two"]);
    }

    #[tokio::test]
    async fn test_delta_stream_parses_unterminated_tail() {
        let deltas =
            collect_deltas(vec![b"data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"])
                .await;

        assert_eq!(deltas, vec!["tail"]);
    }
}
