//! Shutdown coordination: drain feedback, cancel sources, collect every
//! task outcome, and classify failures.

use crate::controller::ControllerClient;
use crate::engine::supervisor::SourceHandle;
use crate::runtime::telemetry::{log_failure_without_data, Telemetry};
use crate::websocket::event_log::{EventLog, EventLogEntry};
use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Aggregate outcome of one pipeline generation. Task failures are not a
/// variant: they surface as the aggregate error at the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    ReloadRequested,
}

/// Classified result of one joined task.
#[derive(Debug)]
pub enum TaskOutcome {
    Completed,
    /// Expected during a deliberate shutdown; never reported as a failure.
    Cancelled,
    Failed(anyhow::Error),
}

pub struct ShutdownParams {
    pub event_log: EventLog,
    pub feedback: Option<JoinHandle<Result<()>>>,
    pub feedback_timeout: Duration,
    pub sources: Vec<SourceHandle>,
    pub cancel: CancellationToken,
    pub source_join_deadline: Duration,
    pub controller: Option<ControllerClient>,
    pub reload_requested: bool,
    pub telemetry: Arc<Telemetry>,
}

/// Sequences the end of a run. The order is a contract:
/// sentinel first so the feedback path knows to stop, then the bounded
/// feedback wait, then source cancellation, then an exhaustive join that
/// converts failures into values instead of letting the first one win.
pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    pub async fn finalize(params: ShutdownParams) -> Result<RunOutcome> {
        let ShutdownParams {
            event_log,
            feedback,
            feedback_timeout,
            sources,
            cancel,
            source_join_deadline,
            controller,
            reload_requested,
            telemetry,
        } = params;

        event_log.append(EventLogEntry::Exit);

        let feedback_outcome = match feedback {
            None => None,
            Some(mut handle) => match time::timeout(feedback_timeout, &mut handle).await {
                Ok(joined) => Some(("feedback publisher", classify_join(joined))),
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = feedback_timeout.as_millis() as u64,
                        "feedback publisher did not drain in time; abandoning it"
                    );
                    handle.abort();
                    Some(("feedback publisher", classify_join(handle.await)))
                }
            },
        };

        tracing::info!("cancelling event source tasks");
        cancel.cancel();

        let deadline = Instant::now() + source_join_deadline;
        let mut outcomes: Vec<(String, TaskOutcome)> = Vec::with_capacity(sources.len() + 1);
        if let Some((name, outcome)) = feedback_outcome {
            outcomes.push((name.to_owned(), outcome));
        }

        for source in sources {
            let SourceHandle { name, mut handle } = source;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let outcome = match time::timeout(remaining, &mut handle).await {
                Ok(joined) => classify_join(joined),
                Err(_) => {
                    tracing::warn!(
                        source = %name,
                        "source task ignored cancellation past the deadline; aborting it"
                    );
                    handle.abort();
                    classify_join(handle.await)
                }
            };
            outcomes.push((name, outcome));
        }

        let mut failures = 0usize;
        for (name, outcome) in &outcomes {
            match outcome {
                TaskOutcome::Completed | TaskOutcome::Cancelled => {}
                TaskOutcome::Failed(error) => {
                    failures += 1;
                    telemetry.record_source_failure();
                    log_failure_without_data(name, error);
                }
            }
        }

        tracing::info!(tasks = outcomes.len(), failures, "main complete");

        if let Some(client) = controller {
            client.close_session().await;
        }

        if failures > 0 {
            bail!("{failures} task(s) failed; run marked as failed");
        }
        if reload_requested {
            return Ok(RunOutcome::ReloadRequested);
        }
        Ok(RunOutcome::Completed)
    }
}

fn classify_join(joined: std::result::Result<Result<()>, JoinError>) -> TaskOutcome {
    match joined {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(error)) => TaskOutcome::Failed(error),
        Err(join_error) if join_error.is_cancelled() => TaskOutcome::Cancelled,
        Err(join_error) => TaskOutcome::Failed(anyhow!(join_error)),
    }
}
