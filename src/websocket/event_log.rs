use crate::rules::model::EventData;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Tagged record appended by the driver/engine and consumed by the feedback
/// publisher. `Exit` is the reserved sentinel: no entry follows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum EventLogEntry {
    Event {
        group: String,
        data: EventData,
    },
    Action {
        group: String,
        rule: String,
        action: String,
    },
    Exit,
}

/// Append-only handle to the run's event log.
///
/// Backed by an unbounded channel when a feedback sink is configured;
/// otherwise a null log that accepts and discards entries, so callers never
/// branch on whether feedback is enabled.
#[derive(Clone, Debug)]
pub struct EventLog {
    tx: Option<mpsc::UnboundedSender<EventLogEntry>>,
}

impl EventLog {
    /// Log wired to a consumer; the receiver side feeds the publisher task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EventLogEntry>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Log that discards every entry.
    pub fn null() -> Self {
        Self { tx: None }
    }

    pub fn is_null(&self) -> bool {
        self.tx.is_none()
    }

    /// Appends one entry. Never blocks; an entry appended after the
    /// consumer went away is dropped, matching the best-effort feedback
    /// contract.
    pub fn append(&self, entry: EventLogEntry) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(entry);
        }
    }
}
