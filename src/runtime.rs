//! Runtime glue that wires configuration, startup validation, telemetry,
//! and runner orchestration.

pub mod config;
pub mod runner;
pub mod telemetry;
pub mod validate;
