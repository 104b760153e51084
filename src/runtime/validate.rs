//! Startup validation: the gate that runs before any task is spawned.

use crate::controller::{ControllerClient, ControllerParams};
use crate::rules::loader::substitute_variables;
use crate::rules::vault::ensure_decryptable;
use crate::runtime::config::StartupArgs;
use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// Action kinds that cannot run without an inventory.
pub const INVENTORY_ACTIONS: [&str; 2] = ["run_playbook", "run_module"];

/// Action kinds that cannot run without a remote controller.
pub const CONTROLLER_ACTIONS: [&str; 2] = ["run_job_template", "run_workflow_template"];

/// Classified startup failures. Raised before any task starts, so no
/// partial cleanup is ever required for these.
#[derive(Debug)]
pub enum StartupError {
    InventoryNeeded { rule: String, action: String },
    InventoryNotFound { path: PathBuf },
    ControllerNeeded { rule: String, action: String },
    InvalidControllerUrl { url: String },
    Undecryptable { location: String },
    RulebookNotFound { path: PathBuf },
    WorkloadExchange { reason: String },
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::InventoryNeeded { rule, action } => write!(
                f,
                "rule {rule:?} has an action {action:?} which needs an inventory to be defined"
            ),
            StartupError::InventoryNotFound { path } => {
                write!(f, "inventory {} not found", path.display())
            }
            StartupError::ControllerNeeded { rule, action } => write!(
                f,
                "rule {rule:?} has an action {action:?} which needs a controller url and token"
            ),
            StartupError::InvalidControllerUrl { url } => {
                write!(f, "invalid controller url {url:?}")
            }
            StartupError::Undecryptable { location } => {
                write!(f, "vaulted content at {location} cannot be decrypted")
            }
            StartupError::RulebookNotFound { path } => {
                write!(f, "could not find rulebook {}", path.display())
            }
            StartupError::WorkloadExchange { reason } => {
                write!(f, "error communicating with the websocket server: {reason}")
            }
        }
    }
}

impl std::error::Error for StartupError {}

/// Checks every action of every rule against the configured inventory and
/// controller parameters. Returns whether a controller reachability probe
/// is required before the run may start.
pub fn validate_actions(args: &StartupArgs) -> Result<bool, StartupError> {
    let mut check_controller = false;

    for group in &args.rulesets {
        for rule in &group.rules {
            for action in &rule.actions {
                let kind = action.kind.as_str();

                if CONTROLLER_ACTIONS.contains(&kind) {
                    check_controller = true;
                    if !args.controller.is_configured() {
                        return Err(StartupError::ControllerNeeded {
                            rule: rule.name.clone(),
                            action: action.kind.clone(),
                        });
                    }
                }

                if INVENTORY_ACTIONS.contains(&kind) {
                    match &args.inventory {
                        None => {
                            return Err(StartupError::InventoryNeeded {
                                rule: rule.name.clone(),
                                action: action.kind.clone(),
                            });
                        }
                        Some(path) if !path.exists() => {
                            return Err(StartupError::InventoryNotFound { path: path.clone() });
                        }
                        Some(_) => {}
                    }
                }

                if args.check_vault {
                    let location = format!("rule {:?} action {:?}", rule.name, action.kind);
                    let value = Value::Object(action.args.clone());
                    ensure_decryptable(&location, &value)
                        .map_err(|_| StartupError::Undecryptable { location })?;
                }
            }
        }
    }

    Ok(check_controller)
}

/// Rejects top-level variables that still carry undecrypted vault content.
pub fn validate_variables(args: &StartupArgs) -> Result<(), StartupError> {
    for (name, value) in &args.variables {
        let location = format!("variable {name:?}");
        ensure_decryptable(&location, value)
            .map_err(|_| StartupError::Undecryptable { location })?;
    }
    Ok(())
}

/// Validates the controller URL shape, probes the remote configuration, and
/// returns the connected client for the rest of the run.
///
/// A token-only configuration carries no URL and is probed by nothing, so
/// `None` is returned. The probe result is logged for diagnostics; an
/// unreachable controller is fatal here, before any source task exists.
pub async fn validate_controller_params(
    params: &ControllerParams,
) -> Result<Option<ControllerClient>> {
    let Some(url) = params.url.as_deref() else {
        return Ok(None);
    };
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(StartupError::InvalidControllerUrl { url: url.to_owned() }.into());
    }

    let client = ControllerClient::new(params)?;
    let info = client
        .get_config()
        .await
        .context("controller reachability probe failed")?;
    tracing::info!(version = %info.version, "controller version");

    Ok(Some(client))
}

/// Produces the explicit environment map threaded into every source task,
/// with `${name}` references substituted from the run variables.
pub fn normalize_env(args: &StartupArgs) -> Result<HashMap<String, String>> {
    substitute_variables(&args.env_vars, &args.variables)
}
