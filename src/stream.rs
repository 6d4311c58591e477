use futures_util::{pin_mut, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;

use crate::api::ApiClient;
use crate::tui::AppEvent;

const DATA_PREFIX: &str = "data: ";

/// One decoded unit from the server's incremental response protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk {
        text: String,
        model: Option<String>,
        timestamp: Option<String>,
    },
    Done,
    Error(String),
}

/// Raw shape of a `data:` line payload.
#[derive(Deserialize)]
struct WireEvent {
    error: Option<String>,
    #[serde(default)]
    done: bool,
    chunk: Option<String>,
    model: Option<String>,
    timestamp: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum LineOutcome {
    Event(StreamEvent),
    Ignored,
    Malformed,
}

/// Classify one line of the response body. Only `data: `-prefixed lines
/// carry events; an `error` field wins over `done`, which wins over
/// `chunk` (a terminal chunk may carry both).
pub fn parse_line(line: &str) -> LineOutcome {
    let line = line.trim();
    let payload = match line.strip_prefix(DATA_PREFIX) {
        Some(p) => p.trim(),
        None => return LineOutcome::Ignored,
    };
    if payload.is_empty() {
        return LineOutcome::Ignored;
    }

    let event: WireEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(_) => return LineOutcome::Malformed,
    };

    if let Some(error) = event.error {
        return LineOutcome::Event(StreamEvent::Error(error));
    }
    if event.done {
        return LineOutcome::Event(StreamEvent::Done);
    }
    match event.chunk {
        // Empty chunks carry no text and are dropped.
        Some(text) if !text.is_empty() => LineOutcome::Event(StreamEvent::Chunk {
            text,
            model: event.model,
            timestamp: event.timestamp,
        }),
        _ => LineOutcome::Ignored,
    }
}

/// Drive a byte stream to completion, forwarding decoded events to the
/// controller loop. Partial lines are buffered across reads. Stops at the
/// first terminal event (done or error). Returns the number of malformed
/// lines that were skipped.
pub async fn pump<S, B, E>(byte_stream: S, tx: &UnboundedSender<AppEvent>) -> usize
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    pin_mut!(byte_stream);

    let mut buffer = String::new();
    let mut skipped = 0;

    while let Some(read) = byte_stream.next().await {
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send(AppEvent::Stream(StreamEvent::Error(format!(
                    "stream read failed: {}",
                    e
                ))));
                return skipped;
            }
        };

        buffer.push_str(&String::from_utf8_lossy(bytes.as_ref()));

        while let Some(newline_pos) = buffer.find('\n') {
            let line: String = buffer.drain(..=newline_pos).collect();
            match parse_line(&line) {
                LineOutcome::Event(event) => {
                    let terminal =
                        matches!(event, StreamEvent::Done | StreamEvent::Error(_));
                    if tx.send(AppEvent::Stream(event)).is_err() || terminal {
                        return skipped;
                    }
                }
                LineOutcome::Malformed => skipped += 1,
                LineOutcome::Ignored => {}
            }
        }
    }

    skipped
}

/// Entry point for the spawned streaming task: open the request, pump
/// events, and always announce closure so the in-flight flag resets even
/// when the server hangs up without a done marker.
pub async fn run(api: ApiClient, model: String, message: String, tx: UnboundedSender<AppEvent>) {
    let skipped = match api.open_chat_stream(&model, &message).await {
        Ok(response) => pump(response.bytes_stream(), &tx).await,
        Err(e) => {
            let _ = tx.send(AppEvent::Stream(StreamEvent::Error(e.to_string())));
            0
        }
    };

    let _ = tx.send(AppEvent::StreamClosed { skipped });
}
