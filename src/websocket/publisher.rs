use crate::runtime::telemetry::Telemetry;
use crate::websocket::event_log::EventLogEntry;
use anyhow::{Context, Result};
use futures::SinkExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tungstenite::Message;

/// Forwards event-log entries to the remote feedback sink, one JSON text
/// frame per entry, preserving production order.
///
/// Runs for the whole pipeline generation and terminates when it observes
/// the `Exit` sentinel or cancellation. Delivery is best-effort: whatever is
/// still queued when the task stops is counted as dropped, never retried.
pub async fn publish_event_log(
    url: String,
    mut entries: mpsc::UnboundedReceiver<EventLogEntry>,
    telemetry: Arc<Telemetry>,
    cancel: CancellationToken,
) -> Result<()> {
    let (stream, _response) = tokio_tungstenite::connect_async(&url)
        .await
        .with_context(|| format!("failed to connect feedback websocket {url}"))?;
    let (mut sink, _read) = futures::StreamExt::split(stream);
    tracing::info!(url = %url, "feedback publisher connected");

    loop {
        tokio::select! {
            maybe = entries.recv() => match maybe {
                Some(EventLogEntry::Exit) => {
                    tracing::debug!("event log terminated; closing feedback stream");
                    break;
                }
                Some(entry) => {
                    let frame = serde_json::to_string(&entry)
                        .context("failed to serialize event log entry")?;
                    sink.send(Message::Text(frame))
                        .await
                        .context("failed to forward event log entry")?;
                    telemetry.record_feedback_forwarded();
                }
                None => {
                    tracing::debug!("event log closed without sentinel");
                    break;
                }
            },
            _ = cancel.cancelled() => {
                tracing::debug!("feedback publisher cancelled");
                break;
            }
        }
    }

    let dropped = drain_remaining(&mut entries);
    if dropped > 0 {
        telemetry.record_feedback_dropped(dropped);
        tracing::warn!(dropped, "event log entries not forwarded before shutdown");
    }

    let _ = sink.send(Message::Close(None)).await;
    Ok(())
}

fn drain_remaining(entries: &mut mpsc::UnboundedReceiver<EventLogEntry>) -> u64 {
    let mut dropped = 0;
    while let Ok(entry) = entries.try_recv() {
        if !matches!(entry, EventLogEntry::Exit) {
            dropped += 1;
        }
    }
    dropped
}
