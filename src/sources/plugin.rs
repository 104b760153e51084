use crate::rules::model::{EventData, SourceDeclaration, Variables};
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type SourceFuture = Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'static>>;

/// Contract implemented by event source plugins.
///
/// A source runs until it exhausts its events, fails, or observes
/// cancellation. It must not interpret cancellation as an error: return
/// `Ok(())` when the context token fires. The runtime never looks inside a
/// source beyond its termination.
pub trait EventSource: Send + std::fmt::Debug + 'static {
    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture;
}

/// Everything a source task observes: its declaration, the run's variables
/// and normalized environment, the search directories for auxiliary plugin
/// data, the shutdown grace it may use to flush, and the mailbox sender.
///
/// The environment is an explicit per-run map rather than process state so
/// concurrent runs stay isolated.
pub struct SourceContext {
    pub declaration: SourceDeclaration,
    pub variables: Arc<Variables>,
    pub env: Arc<HashMap<String, String>>,
    pub source_dirs: Arc<Vec<PathBuf>>,
    pub shutdown_delay: Duration,
    events: mpsc::Sender<EventData>,
    cancel: CancellationToken,
}

/// Result of attempting to enqueue one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// The event was placed in the group mailbox.
    Delivered,
    /// Cancellation fired while waiting for mailbox capacity; the event was
    /// not delivered and the source should unwind.
    Cancelled,
}

impl SourceContext {
    pub(crate) fn new(
        declaration: SourceDeclaration,
        variables: Arc<Variables>,
        env: Arc<HashMap<String, String>>,
        source_dirs: Arc<Vec<PathBuf>>,
        shutdown_delay: Duration,
        events: mpsc::Sender<EventData>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            declaration,
            variables,
            env,
            source_dirs,
            shutdown_delay,
            events,
            cancel,
        }
    }

    /// Pushes one event into the group mailbox.
    ///
    /// The mailbox holds a single event, so this suspends until the driver
    /// has drained the previous one; that suspension is also the prompt
    /// cancellation point required of every source.
    pub async fn send_event(&self, event: EventData) -> SendStatus {
        tokio::select! {
            sent = self.events.send(event) => match sent {
                Ok(()) => SendStatus::Delivered,
                // The receiver only disappears during teardown; treat it
                // like cancellation rather than a failure.
                Err(_) => SendStatus::Cancelled,
            },
            _ = self.cancel.cancelled() => SendStatus::Cancelled,
        }
    }

    /// Cancellation-aware sleep for sources that pace their production.
    /// Returns false when cancellation interrupted the wait.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancel.cancelled() => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the run asks this source to stop.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}
