use crate::engine::driver::{run_rulesets, DriverContext, RuleEngine};
use crate::engine::monitor::RulebookMonitor;
use crate::engine::shutdown::{RunOutcome, ShutdownCoordinator, ShutdownParams};
use crate::engine::supervisor::{spawn_sources, SpawnSourcesParams};
use crate::rules::loader::{load_rulebook, load_vars};
use crate::runtime::config::{RunConfig, StartupArgs};
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::runtime::validate::{
    normalize_env, validate_actions, validate_controller_params, validate_variables,
};
use crate::sources::builtin::SourceRegistry;
use crate::websocket::event_log::EventLog;
use crate::websocket::publisher::publish_event_log;
use crate::websocket::workload::request_workload;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Coordinates pipeline generations and handles OS signals for graceful
/// shutdown.
///
/// A generation runs from startup validation to shutdown coordination.
/// When the driver reports a rulebook change the runner loops and starts a
/// fresh generation from the original configuration; nothing from the
/// previous generation survives. The reload count is unbounded.
pub struct Runner<E: RuleEngine> {
    config: RunConfig,
    engine: Arc<E>,
    registry: SourceRegistry,
    shutdown: CancellationToken,
    telemetry: Arc<Telemetry>,
}

impl<E: RuleEngine> Runner<E> {
    /// Creates a runner with the bundled source registry.
    pub fn new(config: RunConfig, engine: E) -> Self {
        Self::with_registry(config, engine, SourceRegistry::with_builtins())
    }

    /// Creates a runner with a caller-supplied source registry.
    pub fn with_registry(config: RunConfig, engine: E, registry: SourceRegistry) -> Self {
        Self {
            config,
            engine: Arc::new(engine),
            registry,
            shutdown: CancellationToken::new(),
            telemetry: Arc::new(Telemetry::default()),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can
    /// integrate with their own signal handlers.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs generations until one completes without requesting a reload,
    /// fails, or the root token is cancelled.
    pub async fn run(&self) -> Result<RunOutcome> {
        loop {
            let args = self.load_startup_args().await?;
            match self.run_generation(args).await? {
                RunOutcome::ReloadRequested if !self.shutdown.is_cancelled() => {
                    self.telemetry.record_reload();
                    tracing::warn!("rulebook changed; restarting the pipeline");
                    continue;
                }
                outcome => return Ok(outcome),
            }
        }
    }

    /// Runs until completion or a Ctrl-C (SIGINT), whichever comes first.
    /// On SIGINT the root token is cancelled and the in-flight generation
    /// is driven through its full shutdown sequence before returning.
    pub async fn run_until_ctrl_c(&self) -> Result<RunOutcome> {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            outcome = &mut run => return outcome,
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down the pipeline");
                self.shutdown.cancel();
            }
        }

        run.await
    }

    async fn load_startup_args(&self) -> Result<StartupArgs> {
        if self.config.worker() {
            tracing::info!("starting worker mode");
            let url = self.config.websocket_url().expect("validated by config");
            let id = self.config.activation_id().expect("validated by config");
            return request_workload(url, id).await;
        }

        let variables = load_vars(self.config.vars_file(), self.config.env_passthrough())?;
        let (rulesets, check_vault) = match self.config.rulebook() {
            Some(path) => load_rulebook(path)?,
            None => {
                tracing::debug!("loading no rules");
                (Vec::new(), false)
            }
        };

        Ok(StartupArgs {
            rulesets,
            variables,
            env_vars: Default::default(),
            inventory: self.config.inventory().map(Into::into),
            controller: self.config.controller().clone(),
            check_vault,
        })
    }

    /// One full pipeline generation: validate, spawn, drive, coordinate
    /// shutdown. The coordinator runs even when the driver fails, so no
    /// generation ever leaks tasks.
    async fn run_generation(&self, args: StartupArgs) -> Result<RunOutcome> {
        let check_controller = validate_actions(&args)?;
        validate_variables(&args)?;
        let env = normalize_env(&args)?;

        let controller = if check_controller {
            validate_controller_params(&args.controller).await?
        } else {
            None
        };

        let (event_log, feedback_rx) = match self.config.websocket_url() {
            Some(_) => {
                let (log, rx) = EventLog::channel();
                (log, Some(rx))
            }
            None => (EventLog::null(), None),
        };

        let monitor = match self.config.rulebook() {
            Some(path) if self.config.hot_reload() && path.exists() => {
                tracing::warn!(
                    rulebook = %path.display(),
                    "hot-reload requested; monitoring for rulebook file changes"
                );
                Some(RulebookMonitor::spawn(path)?)
            }
            _ => None,
        };

        let run_token = self.shutdown.child_token();
        let reporter = spawn_metrics_reporter(
            self.telemetry.clone(),
            run_token.clone(),
            self.config.metrics_interval(),
        );

        tracing::info!("starting sources");
        let spawned = match spawn_sources(SpawnSourcesParams {
            groups: &args.rulesets,
            registry: &self.registry,
            source_dirs: Arc::new(self.config.source_dirs().to_vec()),
            variables: Arc::new(args.variables.clone()),
            env: Arc::new(env),
            shutdown_delay: self.config.shutdown_delay(),
            cancel: &run_token,
        }) {
            Ok(spawned) => spawned,
            Err(err) => {
                run_token.cancel();
                if let Err(join_err) = reporter.await {
                    tracing::warn!(error = %join_err, "metrics reporter task panicked");
                }
                if let Some(client) = controller {
                    client.close_session().await;
                }
                return Err(err);
            }
        };

        let feedback = feedback_rx.map(|rx| {
            let url = self
                .config
                .websocket_url()
                .expect("feedback channel implies a websocket url")
                .to_owned();
            tokio::spawn(publish_event_log(
                url,
                rx,
                self.telemetry.clone(),
                run_token.child_token(),
            ))
        });

        tracing::info!("starting rules");
        let driver_result = run_rulesets(
            self.engine.clone(),
            event_log.clone(),
            spawned.queues,
            DriverContext {
                variables: Arc::new(args.variables),
                inventory: args.inventory,
                telemetry: self.telemetry.clone(),
            },
            monitor.as_ref().map(RulebookMonitor::subscribe),
            run_token.clone(),
        )
        .await;
        let reload_requested = *driver_result.as_ref().unwrap_or(&false);

        let outcome = ShutdownCoordinator::finalize(ShutdownParams {
            event_log,
            feedback,
            feedback_timeout: self.config.feedback_timeout(),
            sources: spawned.handles,
            cancel: run_token,
            source_join_deadline: self.config.source_join_deadline(),
            controller,
            reload_requested,
            telemetry: self.telemetry.clone(),
        })
        .await;

        if let Err(err) = reporter.await {
            tracing::warn!(error = %err, "metrics reporter task panicked");
        }
        drop(monitor);

        // Driver errors surface only after the full shutdown sequence ran.
        driver_result.context("rule evaluation failed")?;
        outcome
    }
}
