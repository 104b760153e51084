use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use once_cell::sync::Lazy;
use ruleflow::{
    DriverContext, EngineFuture, EventData, EventLog, EventSource, RuleEngine, RuleGroup,
    SourceContext, SourceDeclaration, SourceFuture, SourceRegistry, Telemetry,
};
use serde_json::json;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

/// Builds a rule group from source declarations, with no rules attached.
pub fn group(name: &str, sources: Vec<SourceDeclaration>) -> Arc<RuleGroup> {
    Arc::new(RuleGroup {
        name: name.into(),
        sources,
        rules: Vec::new(),
    })
}

/// Declaration referencing a registered source type.
pub fn decl(source_type: &str) -> SourceDeclaration {
    SourceDeclaration {
        name: None,
        source_type: source_type.into(),
        config: serde_json::Map::new(),
    }
}

pub fn test_ctx(telemetry: Arc<Telemetry>) -> DriverContext {
    DriverContext {
        variables: Arc::new(serde_json::Map::new()),
        inventory: None,
        telemetry,
    }
}

/// Source that emits a fixed script of events, then exits cleanly.
#[derive(Debug)]
pub struct ScriptedSource {
    pub events: Vec<EventData>,
    pub delivered: Option<Arc<AtomicUsize>>,
}

impl EventSource for ScriptedSource {
    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture {
        Box::pin(async move {
            for event in self.events {
                if ctx.send_event(event).await == ruleflow::SendStatus::Cancelled {
                    return Ok(());
                }
                if let Some(counter) = &self.delivered {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
            Ok(())
        })
    }
}

/// Source that emits its script and then raises a failure.
#[derive(Debug)]
pub struct FailingSource {
    pub events: Vec<EventData>,
    pub message: String,
}

impl EventSource for FailingSource {
    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture {
        Box::pin(async move {
            for event in self.events {
                if ctx.send_event(event).await == ruleflow::SendStatus::Cancelled {
                    return Ok(());
                }
            }
            Err(anyhow!(self.message))
        })
    }
}

/// Source that emits its script and then holds its queue slot open until
/// the run cancels it.
#[derive(Debug)]
pub struct LingeringSource {
    pub events: Vec<EventData>,
}

impl EventSource for LingeringSource {
    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture {
        Box::pin(async move {
            for event in self.events {
                if ctx.send_event(event).await == ruleflow::SendStatus::Cancelled {
                    return Ok(());
                }
            }
            ctx.cancelled().await;
            Ok(())
        })
    }
}

/// Registers a scripted source under `source_type`, returning a counter of
/// how many times the factory instantiated it (i.e. how many tasks were
/// spawned from it across generations).
pub fn register_scripted(
    registry: &mut SourceRegistry,
    source_type: &str,
    events: Vec<EventData>,
) -> Arc<AtomicUsize> {
    let spawned = Arc::new(AtomicUsize::new(0));
    let counter = spawned.clone();
    registry.register(source_type, move |_decl| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            events: events.clone(),
            delivered: None,
        }))
    });
    spawned
}

pub fn register_counting(
    registry: &mut SourceRegistry,
    source_type: &str,
    events: Vec<EventData>,
) -> Arc<AtomicUsize> {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = delivered.clone();
    registry.register(source_type, move |_decl| {
        Ok(Box::new(ScriptedSource {
            events: events.clone(),
            delivered: Some(counter.clone()),
        }))
    });
    delivered
}

pub fn register_failing(
    registry: &mut SourceRegistry,
    source_type: &str,
    events: Vec<EventData>,
    message: &str,
) {
    let message = message.to_owned();
    registry.register(source_type, move |_decl| {
        Ok(Box::new(FailingSource {
            events: events.clone(),
            message: message.clone(),
        }))
    });
}

pub fn register_lingering(
    registry: &mut SourceRegistry,
    source_type: &str,
    events: Vec<EventData>,
) {
    registry.register(source_type, move |_decl| {
        Ok(Box::new(LingeringSource {
            events: events.clone(),
        }))
    });
}

/// Events `{"src": name, "i": n}` for n in `values`.
pub fn tagged_events(src: &str, values: &[u64]) -> Vec<EventData> {
    values.iter().map(|i| json!({"src": src, "i": i})).collect()
}

#[derive(Default)]
pub struct RecordedEvents {
    pub events: Vec<(String, EventData)>,
}

/// Engine that records every (group, event) pair it sees. An optional
/// semaphore gates each evaluation so tests can hold the driver mid-pass.
#[derive(Clone)]
pub struct RecordingEngine {
    state: Arc<Mutex<RecordedEvents>>,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingEngine {
    pub fn new() -> (Self, Arc<Mutex<RecordedEvents>>) {
        let state = Arc::new(Mutex::new(RecordedEvents::default()));
        (
            Self {
                state: state.clone(),
                gate: None,
            },
            state,
        )
    }

    pub fn gated(gate: Arc<Semaphore>) -> (Self, Arc<Mutex<RecordedEvents>>) {
        let state = Arc::new(Mutex::new(RecordedEvents::default()));
        (
            Self {
                state: state.clone(),
                gate: Some(gate),
            },
            state,
        )
    }
}

impl RuleEngine for RecordingEngine {
    fn handle_event<'a>(
        &'a self,
        group: &'a RuleGroup,
        event: &'a EventData,
        _log: &'a EventLog,
        _ctx: &'a DriverContext,
    ) -> EngineFuture<'a> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await.map_err(|_| anyhow!("gate closed"))?;
                permit.forget();
            }
            let mut guard = self.state.lock().await;
            guard.events.push((group.name.clone(), event.clone()));
            Ok(())
        })
    }
}

pub async fn wait_for_recorded_len(
    state: &Arc<Mutex<RecordedEvents>>,
    target: usize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    loop {
        {
            let guard = state.lock().await;
            if guard.events.len() >= target {
                return Ok(());
            }
        }

        if start.elapsed() > timeout {
            bail!("engine did not record {target} events within {timeout:?}");
        }

        sleep(Duration::from_millis(20)).await;
    }
}

/// Asserts that the events carrying `src` appear in exactly the relative
/// order of `expected`, regardless of interleaving with other sources.
pub fn assert_source_order(recorded: &[(String, EventData)], src: &str, expected: &[u64]) {
    let seen: Vec<u64> = recorded
        .iter()
        .filter(|(_, event)| event["src"] == src)
        .map(|(_, event)| event["i"].as_u64().expect("tagged event"))
        .collect();
    assert_eq!(seen, expected, "per-source order must be preserved for {src}");
}
