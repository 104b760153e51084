//! Rule engine driver: drains the per-group queues, hands events to the
//! matching collaborator, and reports whether a reload was requested.

use crate::rules::model::{EventData, RuleGroup, RuleGroupQueue, Variables};
use crate::runtime::telemetry::Telemetry;
use crate::websocket::event_log::{EventLog, EventLogEntry};
use anyhow::Result;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

pub type EngineFuture<'a> = Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>>;

/// Run-wide state handed to the matching collaborator with every event.
#[derive(Debug, Clone)]
pub struct DriverContext {
    pub variables: Arc<Variables>,
    pub inventory: Option<PathBuf>,
    pub telemetry: Arc<Telemetry>,
}

/// External rule-matching collaborator.
///
/// The driver owns queue draining and lifecycle; implementations own
/// condition evaluation and action dispatch. An error from `handle_event`
/// is fatal for the run (surfaced after full shutdown, never mid-teardown).
pub trait RuleEngine: Send + Sync + 'static {
    fn handle_event<'a>(
        &'a self,
        group: &'a RuleGroup,
        event: &'a EventData,
        log: &'a EventLog,
        ctx: &'a DriverContext,
    ) -> EngineFuture<'a>;
}

/// Placeholder engine that treats every rule as matched: each incoming
/// event is logged and every action of the group's rules is recorded as
/// fired. Useful for wiring and demos until a condition engine is plugged
/// in.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchAllEngine;

impl RuleEngine for MatchAllEngine {
    fn handle_event<'a>(
        &'a self,
        group: &'a RuleGroup,
        event: &'a EventData,
        log: &'a EventLog,
        _ctx: &'a DriverContext,
    ) -> EngineFuture<'a> {
        Box::pin(async move {
            log.append(EventLogEntry::Event {
                group: group.name.clone(),
                data: event.clone(),
            });
            for rule in &group.rules {
                for action in &rule.actions {
                    tracing::info!(
                        group = %group.name,
                        rule = %rule.name,
                        action = %action.kind,
                        "rule matched"
                    );
                    log.append(EventLogEntry::Action {
                        group: group.name.clone(),
                        rule: rule.name.clone(),
                        action: action.kind.clone(),
                    });
                }
            }
            Ok(())
        })
    }
}

/// Drives rule evaluation over the group queues until every queue closes,
/// the monitored rulebook changes, or the run is cancelled.
///
/// Returns `Ok(true)` when a reload should occur. Each group drains in its
/// own task so one group's slow engine pass never stalls another group's
/// mailbox; within a group, events are processed strictly in arrival order.
pub async fn run_rulesets<E: RuleEngine>(
    engine: Arc<E>,
    event_log: EventLog,
    ruleset_queues: Vec<RuleGroupQueue>,
    ctx: DriverContext,
    mut reload_rx: Option<watch::Receiver<bool>>,
    cancel: CancellationToken,
) -> Result<bool> {
    let drain_token = cancel.child_token();

    let mut drains = Vec::with_capacity(ruleset_queues.len());
    for queue in ruleset_queues {
        let engine = engine.clone();
        let event_log = event_log.clone();
        let ctx = ctx.clone();
        let token = drain_token.clone();
        drains.push(tokio::spawn(drain_group(engine, event_log, queue, ctx, token)));
    }

    let mut joined = futures::future::join_all(drains);

    let reload_signal = async {
        match reload_rx.as_mut() {
            Some(rx) => loop {
                if *rx.borrow_and_update() {
                    break;
                }
                if rx.changed().await.is_err() {
                    // Monitor went away; a reload can no longer fire.
                    futures::future::pending::<()>().await;
                }
            },
            None => futures::future::pending().await,
        }
    };

    let (results, reload) = tokio::select! {
        results = &mut joined => (results, false),
        _ = reload_signal => {
            tracing::info!("rulebook change detected; stopping rule evaluation");
            drain_token.cancel();
            (joined.await, true)
        }
    };

    for result in results {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(join_err) => return Err(join_err.into()),
        }
    }

    Ok(reload)
}

async fn drain_group<E: RuleEngine>(
    engine: Arc<E>,
    event_log: EventLog,
    mut queue: RuleGroupQueue,
    ctx: DriverContext,
    token: CancellationToken,
) -> Result<()> {
    let group = queue.group.clone();
    loop {
        tokio::select! {
            maybe = queue.events.recv() => match maybe {
                Some(event) => {
                    ctx.telemetry.record_event_delivered();
                    engine.handle_event(&group, &event, &event_log, &ctx).await?;
                }
                None => {
                    tracing::debug!(group = %group.name, "all sources exhausted; queue closed");
                    return Ok(());
                }
            },
            _ = token.cancelled() => {
                tracing::debug!(group = %group.name, "rule evaluation cancelled");
                return Ok(());
            }
        }
    }
}
