//! # ruleflow
//!
//! Runtime core of an event-driven rule automation engine.
//!
//! The pipeline spawns one task per declared event source, routes events
//! into a single capacity-1 mailbox per rule group, drives a rule
//! evaluation pass over those mailboxes, and tears everything down in a
//! strict order that distinguishes deliberate cancellation from real task
//! failures. A monitored rulebook change triggers a full cold restart of
//! the pipeline with no bound on reload count.
//!
//! ```text
//! Validator ─► Supervisor ─► sources ─► group mailboxes ─► Driver
//!                                                            │
//!              Feedback Publisher ◄── event log ◄────────────┤
//!                                                            ▼
//!              Shutdown Coordinator ─► reload? ─► back to Validator
//! ```
//!
//! Rule matching, rulebook parsing, vault decryption, and the controller's
//! remote API are external collaborators behind fixed seams
//! ([`RuleEngine`], [`rules::loader`], [`rules::vault`],
//! [`ControllerClient`]).

pub mod controller;
pub mod engine;
pub mod rules;
pub mod runtime;
pub mod sources;
pub mod websocket;

pub use controller::{ControllerClient, ControllerInfo, ControllerParams};
pub use engine::driver::{run_rulesets, DriverContext, EngineFuture, MatchAllEngine, RuleEngine};
pub use engine::monitor::RulebookMonitor;
pub use engine::shutdown::{RunOutcome, ShutdownCoordinator, ShutdownParams, TaskOutcome};
pub use engine::supervisor::{spawn_sources, SourceHandle, SpawnSourcesParams, SpawnedSources};
pub use rules::model::{Action, EventData, Rule, RuleGroup, RuleGroupQueue, SourceDeclaration};
pub use runtime::config::{RunConfig, RunConfigBuilder, StartupArgs};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use runtime::validate::StartupError;
pub use sources::builtin::SourceRegistry;
pub use sources::plugin::{EventSource, SendStatus, SourceContext, SourceFuture};
pub use websocket::event_log::{EventLog, EventLogEntry};
