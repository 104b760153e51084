//! Pipeline orchestration: source supervision, the rule engine driver
//! shell, rulebook change monitoring, and shutdown coordination.

pub mod driver;
pub mod monitor;
pub mod shutdown;
pub mod supervisor;

pub use driver::{run_rulesets, DriverContext, EngineFuture, MatchAllEngine, RuleEngine};
pub use monitor::RulebookMonitor;
pub use shutdown::{RunOutcome, ShutdownCoordinator, ShutdownParams, TaskOutcome};
pub use supervisor::{spawn_sources, SourceHandle, SpawnSourcesParams, SpawnedSources};
