use crate::controller::ControllerParams;
use crate::rules::model::{RuleGroup, Variables};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_DELAY_SECS: u64 = 60;
const DEFAULT_FEEDBACK_TIMEOUT_SECS: u64 = 5;

/// Invocation-level configuration for the pipeline.
///
/// Built once per process via [`RunConfig::builder`] and validated before
/// any consumer observes the values. Reloads reuse the same configuration;
/// only the loaded startup state is rebuilt per generation.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    rulebook: Option<PathBuf>,
    vars_file: Option<PathBuf>,
    env_passthrough: Option<String>,
    inventory: Option<PathBuf>,
    source_dirs: Vec<PathBuf>,
    controller: ControllerParams,
    websocket_url: Option<String>,
    activation_id: Option<String>,
    worker: bool,
    hot_reload: bool,
    shutdown_delay: Duration,
    feedback_timeout: Duration,
    metrics_interval: Duration,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// Path of the local rulebook, if one was supplied.
    pub fn rulebook(&self) -> Option<&Path> {
        self.rulebook.as_deref()
    }

    pub fn vars_file(&self) -> Option<&Path> {
        self.vars_file.as_deref()
    }

    /// Comma-separated names of environment variables merged into the
    /// variable map at load time.
    pub fn env_passthrough(&self) -> Option<&str> {
        self.env_passthrough.as_deref()
    }

    pub fn inventory(&self) -> Option<&Path> {
        self.inventory.as_deref()
    }

    /// Directories searched by source plugins for auxiliary data.
    pub fn source_dirs(&self) -> &[PathBuf] {
        &self.source_dirs
    }

    pub fn controller(&self) -> &ControllerParams {
        &self.controller
    }

    /// Feedback sink URL; when absent the run uses a null event log.
    pub fn websocket_url(&self) -> Option<&str> {
        self.websocket_url.as_deref()
    }

    /// Remote session id used by worker mode to request its workload.
    pub fn activation_id(&self) -> Option<&str> {
        self.activation_id.as_deref()
    }

    pub fn worker(&self) -> bool {
        self.worker
    }

    pub fn hot_reload(&self) -> bool {
        self.hot_reload
    }

    /// Grace period granted to each source task to flush on shutdown.
    pub fn shutdown_delay(&self) -> Duration {
        self.shutdown_delay
    }

    /// Bounded wait on the feedback publisher during shutdown. Zero is
    /// allowed: the publisher is abandoned immediately.
    pub fn feedback_timeout(&self) -> Duration {
        self.feedback_timeout
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Upper bound on waiting for cancelled source tasks to unwind before
    /// they are forcibly aborted. Derived from the shutdown grace so a
    /// misbehaving source can never hang shutdown indefinitely.
    pub fn source_join_deadline(&self) -> Duration {
        self.shutdown_delay * 2 + Duration::from_secs(5)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker {
            if self.websocket_url.is_none() {
                bail!("worker mode requires a websocket url");
            }
            if self.activation_id.is_none() {
                bail!("worker mode requires an activation id");
            }
        }

        if self.hot_reload && self.rulebook.is_none() {
            bail!("hot-reload requires a rulebook path to monitor");
        }

        if let Some(url) = &self.websocket_url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                bail!("websocket url must start with ws:// or wss://");
            }
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct RunConfigBuilder {
    rulebook: Option<PathBuf>,
    vars_file: Option<PathBuf>,
    env_passthrough: Option<String>,
    inventory: Option<PathBuf>,
    source_dirs: Vec<PathBuf>,
    controller: Option<ControllerParams>,
    websocket_url: Option<String>,
    activation_id: Option<String>,
    worker: bool,
    hot_reload: bool,
    shutdown_delay: Option<Duration>,
    feedback_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl RunConfigBuilder {
    pub fn rulebook(mut self, path: impl Into<PathBuf>) -> Self {
        self.rulebook = Some(path.into());
        self
    }

    pub fn vars_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.vars_file = Some(path.into());
        self
    }

    pub fn env_passthrough(mut self, names: impl Into<String>) -> Self {
        self.env_passthrough = Some(names.into());
        self
    }

    pub fn inventory(mut self, path: impl Into<PathBuf>) -> Self {
        self.inventory = Some(path.into());
        self
    }

    pub fn source_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_dirs.push(path.into());
        self
    }

    pub fn controller(mut self, params: ControllerParams) -> Self {
        self.controller = Some(params);
        self
    }

    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    pub fn activation_id(mut self, id: impl Into<String>) -> Self {
        self.activation_id = Some(id.into());
        self
    }

    pub fn worker(mut self, worker: bool) -> Self {
        self.worker = worker;
        self
    }

    pub fn hot_reload(mut self, hot_reload: bool) -> Self {
        self.hot_reload = hot_reload;
        self
    }

    pub fn shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = Some(delay);
        self
    }

    pub fn feedback_timeout(mut self, timeout: Duration) -> Self {
        self.feedback_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<RunConfig> {
        let config = RunConfig {
            rulebook: self.rulebook,
            vars_file: self.vars_file,
            env_passthrough: self.env_passthrough,
            inventory: self.inventory,
            source_dirs: self.source_dirs,
            controller: self.controller.unwrap_or_default(),
            websocket_url: self.websocket_url,
            activation_id: self.activation_id,
            worker: self.worker,
            hot_reload: self.hot_reload,
            shutdown_delay: self
                .shutdown_delay
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_SHUTDOWN_DELAY_SECS)),
            feedback_timeout: self
                .feedback_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_FEEDBACK_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(crate::runtime::telemetry::DEFAULT_METRICS_INTERVAL),
        };

        config.validate()?;
        Ok(config)
    }
}

/// Per-generation startup state: everything a single pipeline run consumes.
///
/// Built by the local loader or the worker-mode workload exchange; fields
/// are read-only once validation passed.
#[derive(Debug, Default, Clone)]
pub struct StartupArgs {
    pub rulesets: Vec<Arc<RuleGroup>>,
    pub variables: Variables,
    pub env_vars: HashMap<String, String>,
    pub inventory: Option<PathBuf>,
    pub controller: ControllerParams,
    pub check_vault: bool,
}
