use anyhow::Result;
use clap::Parser;
use ruleflow::runtime::telemetry::{init_tracing, log_failure_without_data};
use ruleflow::{ControllerParams, MatchAllEngine, RunConfig, Runner};
use std::path::PathBuf;
use std::time::Duration;

/// Event-driven rule automation runtime.
#[derive(Parser, Debug)]
#[command(name = "ruleflow", version, about)]
struct Cli {
    /// Path to the rulebook document.
    #[arg(long, short = 'r')]
    rulebook: Option<PathBuf>,

    /// Path to a JSON file with run variables.
    #[arg(long)]
    vars: Option<PathBuf>,

    /// Comma-separated environment variable names merged into the run
    /// variables.
    #[arg(long)]
    env_vars: Option<String>,

    /// Inventory path required by inventory-bound actions.
    #[arg(long, short = 'i')]
    inventory: Option<PathBuf>,

    /// Directory searched by source plugins; repeatable.
    #[arg(long = "source-dir")]
    source_dirs: Vec<PathBuf>,

    #[arg(long)]
    controller_url: Option<String>,

    #[arg(long)]
    controller_token: Option<String>,

    #[arg(long)]
    controller_username: Option<String>,

    #[arg(long)]
    controller_password: Option<String>,

    /// Skip verification of the controller's TLS certificate.
    #[arg(long)]
    controller_ssl_no_verify: bool,

    /// Websocket URL receiving the event log feedback stream.
    #[arg(long)]
    websocket_url: Option<String>,

    /// Remote session id used by worker mode.
    #[arg(long)]
    id: Option<String>,

    /// Fetch the startup bundle from the websocket server instead of
    /// loading local files.
    #[arg(long)]
    worker: bool,

    /// Restart the pipeline when the rulebook file changes.
    #[arg(long)]
    hot_reload: bool,

    /// Seconds granted to each source task to flush during shutdown.
    #[arg(long, default_value_t = 60)]
    shutdown_delay: u64,

    /// Seconds to wait for the feedback publisher to drain at shutdown.
    #[arg(long, default_value_t = 5)]
    feedback_timeout: u64,
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let mut builder = RunConfig::builder()
            .worker(self.worker)
            .hot_reload(self.hot_reload)
            .shutdown_delay(Duration::from_secs(self.shutdown_delay))
            .feedback_timeout(Duration::from_secs(self.feedback_timeout))
            .controller(ControllerParams {
                url: self.controller_url,
                token: self.controller_token,
                username: self.controller_username,
                password: self.controller_password,
                verify_ssl: !self.controller_ssl_no_verify,
            });

        if let Some(path) = self.rulebook {
            builder = builder.rulebook(path);
        }
        if let Some(path) = self.vars {
            builder = builder.vars_file(path);
        }
        if let Some(names) = self.env_vars {
            builder = builder.env_passthrough(names);
        }
        if let Some(path) = self.inventory {
            builder = builder.inventory(path);
        }
        for dir in self.source_dirs {
            builder = builder.source_dir(dir);
        }
        if let Some(url) = self.websocket_url {
            builder = builder.websocket_url(url);
        }
        if let Some(id) = self.id {
            builder = builder.activation_id(id);
        }

        builder.build()
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let result = match Cli::parse().into_config() {
        Ok(config) => Runner::new(config, MatchAllEngine).run_until_ctrl_c().await,
        Err(err) => Err(err),
    };

    if let Err(err) = result {
        log_failure_without_data("ruleflow", &err);
        std::process::exit(1);
    }
}
