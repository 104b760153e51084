//! Source task supervision: one concurrently-scheduled task per source
//! declaration, one shared mailbox per rule group.

use crate::rules::model::{RuleGroup, RuleGroupQueue, Variables};
use crate::sources::builtin::SourceRegistry;
use crate::sources::plugin::SourceContext;
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Capacity of every rule group mailbox. One slot is the backpressure
/// contract: a producer suspends on its next event until the driver has
/// drained the previous one.
pub const GROUP_QUEUE_CAPACITY: usize = 1;

/// Handle to one running source task, labelled for failure reports.
#[derive(Debug)]
pub struct SourceHandle {
    pub name: String,
    pub handle: JoinHandle<Result<()>>,
}

/// Everything the supervisor hands back: the spawned task handles and the
/// per-group queues the driver consumes.
#[derive(Debug)]
pub struct SpawnedSources {
    pub handles: Vec<SourceHandle>,
    pub queues: Vec<RuleGroupQueue>,
}

pub struct SpawnSourcesParams<'a> {
    pub groups: &'a [Arc<RuleGroup>],
    pub registry: &'a SourceRegistry,
    pub source_dirs: Arc<Vec<PathBuf>>,
    pub variables: Arc<Variables>,
    pub env: Arc<HashMap<String, String>>,
    pub shutdown_delay: Duration,
    pub cancel: &'a CancellationToken,
}

/// Spawns one task per source declaration across all rule groups.
///
/// The queue for a group is allocated once, before its sources are
/// iterated, so every source of the group shares the same mailbox — the
/// one-queue-per-group invariant lives here and nowhere else. Declarations
/// are resolved through the registry up front: an unknown source type fails
/// before any task has been spawned.
pub fn spawn_sources(params: SpawnSourcesParams<'_>) -> Result<SpawnedSources> {
    let mut resolved = Vec::with_capacity(params.groups.len());
    for group in params.groups {
        let mut sources = Vec::with_capacity(group.sources.len());
        for declaration in &group.sources {
            sources.push((declaration.clone(), params.registry.resolve(declaration)?));
        }
        resolved.push(sources);
    }

    let mut handles = Vec::new();
    let mut queues = Vec::with_capacity(params.groups.len());

    for (group, sources) in params.groups.iter().zip(resolved) {
        // One mailbox per group, allocated before its sources are iterated.
        let (tx, rx) = mpsc::channel(GROUP_QUEUE_CAPACITY);

        for (declaration, source) in sources {
            let name = format!("{}::{}", group.name, declaration.label());
            let ctx = SourceContext::new(
                declaration,
                params.variables.clone(),
                params.env.clone(),
                params.source_dirs.clone(),
                params.shutdown_delay,
                tx.clone(),
                params.cancel.child_token(),
            );

            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                tracing::info!(source = %task_name, "source task started");
                let result = source.run(ctx).await;
                match &result {
                    Ok(()) => tracing::info!(source = %task_name, "source task exited"),
                    Err(err) => {
                        tracing::debug!(source = %task_name, error = %err, "source task raised");
                    }
                }
                result
            });

            handles.push(SourceHandle { name, handle });
        }

        drop(tx);
        queues.push(RuleGroupQueue {
            group: group.clone(),
            events: rx,
        });
    }

    tracing::info!(
        sources = handles.len(),
        groups = queues.len(),
        "source tasks started"
    );

    Ok(SpawnedSources { handles, queues })
}
