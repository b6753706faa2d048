//! Relays LLM deltas to the HTTP response body while accumulating the
//! full transcript, then hands a completed transcript off to history.

use std::convert::Infallible;

use bytes::Bytes;
use futures::StreamExt;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};
use uuid::Uuid;

use crate::history;
use crate::llm_client::{DeltaStream, LlmClient, LlmError};

const RELAY_BUFFER: usize = 32;

/// Who a completed generation belongs to. `session_id` is `None` when the
/// session touch failed; history is saved either way.
#[derive(Debug, Clone, Copy)]
pub struct HistoryOwner {
    pub user_id: Uuid,
    pub session_id: Option<Uuid>,
}

/// Spawns the relay task and returns the response body stream. The relay
/// outlives the response: history is written after the last delta, so a
/// record only ever holds a complete transcript.
pub fn start_relay(
    db: PgPool,
    llm: LlmClient,
    deltas: DeltaStream,
    input: String,
    owner: Option<HistoryOwner>,
) -> ReceiverStream<Result<Bytes, Infallible>> {
    let (tx, rx) = mpsc::channel(RELAY_BUFFER);

    tokio::spawn(async move {
        match relay_deltas(deltas, tx).await {
            Ok(transcript) => {
                let Some(owner) = owner else {
                    return;
                };
                if transcript.trim().is_empty() {
                    debug!(user_id = %owner.user_id, "empty transcript, nothing to save");
                    return;
                }
                if let Err(e) =
                    history::save_prompt_history(&db, &llm, owner, &input, &transcript).await
                {
                    error!(user_id = %owner.user_id, "failed to save prompt history: {e}");
                }
            }
            Err(e) => {
                // Partial output may already be with the client; a broken
                // stream never reaches history.
                error!("prompt stream failed mid-flight: {e}");
            }
        }
    });

    ReceiverStream::new(rx)
}

/// Forwards each delta to the response channel and returns the assembled
/// transcript. Keeps draining upstream after the client disconnects so
/// the transcript still completes.
async fn relay_deltas(
    mut deltas: DeltaStream,
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
) -> Result<String, LlmError> {
    let mut transcript = String::new();
    let mut client_gone = false;

    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        transcript.push_str(&delta);

        if !client_gone && tx.send(Ok(Bytes::from(delta))).await.is_err() {
            debug!("client disconnected, draining rest of stream");
            client_gone = true;
        }
    }

    Ok(transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn deltas_from(parts: Vec<Result<String, LlmError>>) -> DeltaStream {
        Box::pin(stream::iter(parts))
    }

    #[tokio::test]
    async fn test_relay_forwards_and_accumulates() {
        let deltas = deltas_from(vec![Ok("Hello ".to_string()), Ok("world".to_string())]);
        let (tx, mut rx) = mpsc::channel(8);

        let transcript = relay_deltas(deltas, tx).await.unwrap();
        assert_eq!(transcript, "Hello world");

        let mut forwarded = String::new();
        while let Some(Ok(bytes)) = rx.recv().await {
            forwarded.push_str(&String::from_utf8_lossy(&bytes));
        }
        assert_eq!(forwarded, "Hello world");
    }

    #[tokio::test]
    async fn test_relay_completes_transcript_after_client_drop() {
        let deltas = deltas_from(vec![Ok("part one ".to_string()), Ok("part two".to_string())]);
        let (tx, rx) = mpsc::channel(8);
        drop(rx);

        let transcript = relay_deltas(deltas, tx).await.unwrap();
        assert_eq!(transcript, "part one part two");
    }

    #[tokio::test]
    async fn test_relay_surfaces_upstream_error() {
        let deltas = deltas_from(vec![Ok("partial".to_string()), Err(LlmError::EmptyContent)]);
        let (tx, _rx) = mpsc::channel(8);

        assert!(relay_deltas(deltas, tx).await.is_err());
    }
}
