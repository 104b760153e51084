use crate::controller::ControllerParams;
use crate::rules::model::{RuleGroup, Variables};
use crate::runtime::config::StartupArgs;
use crate::runtime::validate::StartupError;
use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tungstenite::Message;

#[derive(Serialize)]
struct WorkloadRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    activation_id: &'a str,
}

#[derive(Deserialize)]
struct WorkloadResponse {
    rulesets: Vec<RuleGroup>,
    #[serde(default)]
    variables: Variables,
    #[serde(default)]
    env_vars: HashMap<String, String>,
    #[serde(default)]
    inventory: Option<PathBuf>,
    #[serde(default)]
    controller: ControllerParams,
    #[serde(default)]
    check_vault: bool,
}

/// Worker mode: fetches the startup bundle for `activation_id` from the
/// remote session instead of loading local files.
///
/// Any failure in the exchange is a classified fatal startup error; the
/// pipeline never starts half-provisioned.
pub async fn request_workload(url: &str, activation_id: &str) -> Result<StartupArgs> {
    let response = exchange(url, activation_id)
        .await
        .map_err(|err| StartupError::WorkloadExchange {
            reason: format!("{err:#}"),
        })?;

    Ok(StartupArgs {
        rulesets: response.rulesets.into_iter().map(Arc::new).collect(),
        variables: response.variables,
        env_vars: response.env_vars,
        inventory: response.inventory,
        controller: response.controller,
        check_vault: response.check_vault,
    })
}

async fn exchange(url: &str, activation_id: &str) -> Result<WorkloadResponse> {
    use anyhow::{bail, Context};

    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("failed to connect to {url}"))?;
    let (mut sink, mut read) = stream.split();

    let request = serde_json::to_string(&WorkloadRequest {
        kind: "Worker",
        activation_id,
    })
    .context("failed to serialize workload request")?;
    sink.send(Message::Text(request))
        .await
        .context("failed to send workload request")?;

    while let Some(frame) = read.next().await {
        match frame.context("workload stream failed")? {
            Message::Text(text) => {
                let response: WorkloadResponse = serde_json::from_str(&text)
                    .context("workload response was not a valid bundle")?;
                let _ = sink.send(Message::Close(None)).await;
                return Ok(response);
            }
            Message::Close(_) => break,
            // Control frames are handled by the library; skip anything else.
            _ => continue,
        }
    }

    bail!("server closed the stream before sending a workload")
}
