use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls
/// back to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    events_delivered: AtomicU64,
    source_failures: AtomicU64,
    feedback_forwarded: AtomicU64,
    feedback_dropped: AtomicU64,
    reloads: AtomicU64,
}

impl Telemetry {
    pub fn record_event_delivered(&self) {
        self.events_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_failure(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feedback_forwarded(&self) {
        self.feedback_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feedback_dropped(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.feedback_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
            feedback_forwarded: self.feedback_forwarded.load(Ordering::Relaxed),
            feedback_dropped: self.feedback_dropped.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
        }
    }

    pub fn events_delivered(&self) -> u64 {
        self.events_delivered.load(Ordering::Relaxed)
    }

    pub fn source_failures(&self) -> u64 {
        self.source_failures.load(Ordering::Relaxed)
    }

    pub fn feedback_forwarded(&self) -> u64 {
        self.feedback_forwarded.load(Ordering::Relaxed)
    }

    pub fn feedback_dropped(&self) -> u64 {
        self.feedback_dropped.load(Ordering::Relaxed)
    }

    pub fn reloads(&self) -> u64 {
        self.reloads.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub events_delivered: u64,
    pub source_failures: u64,
    pub feedback_forwarded: u64,
    pub feedback_dropped: u64,
    pub reloads: u64,
}

/// Spawns a background task that periodically logs event throughput,
/// source failures, and feedback delivery counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(target: "ruleflow::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let delivered_delta = current_snapshot
                        .events_delivered
                        .saturating_sub(last_snapshot.events_delivered);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        delivered_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "ruleflow::metrics",
                        throughput = format!("{throughput:.2}"),
                        events = current_snapshot.events_delivered,
                        source_failures = current_snapshot.source_failures,
                        feedback_forwarded = current_snapshot.feedback_forwarded,
                        feedback_dropped = current_snapshot.feedback_dropped,
                        reloads = current_snapshot.reloads,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}

/// Logs a failure with its cause chain, innermost cause first, without ever
/// dumping payload values that may carry secrets.
pub fn log_failure_without_data(context: &str, error: &anyhow::Error) {
    let causes: Vec<String> = error.chain().map(ToString::to_string).collect();
    for cause in causes.iter().rev() {
        tracing::error!(context, "{cause}");
    }
}
