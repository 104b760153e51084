use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use ruleflow::websocket::request_workload;
use ruleflow::{ControllerParams, RunConfig, RunOutcome, Runner, SourceRegistry, StartupError};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tungstenite::Message;

use crate::support::helpers::{init_tracing, register_scripted, tagged_events, RecordingEngine};
use crate::support::mock_controller::MockControllerServer;

fn write_rulebook(dir: &tempfile::TempDir, action: &str) -> Result<std::path::PathBuf> {
    let path = dir.path().join("rules.json");
    std::fs::write(
        &path,
        serde_json::to_vec(&json!([
            {
                "name": "gated",
                "sources": [{"type": "probe_src", "config": {}}],
                "rules": [{"name": "r", "actions": [{"action": action, "args": {}}]}]
            }
        ]))?,
    )?;
    Ok(path)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unreachable_controller_fails_before_any_source_spawns() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let rulebook = write_rulebook(&dir, "run_job_template")?;

    let mut registry = SourceRegistry::new();
    let spawns = register_scripted(&mut registry, "probe_src", tagged_events("a", &[1]));

    let config = RunConfig::builder()
        .rulebook(&rulebook)
        .controller(ControllerParams {
            // Reserved discard port; nothing listens there.
            url: Some("http://127.0.0.1:9".into()),
            token: Some("tok".into()),
            ..ControllerParams::default()
        })
        .build()?;

    let (engine, _state) = RecordingEngine::new();
    let runner = Runner::with_registry(config, engine, registry);
    let err = timeout(Duration::from_secs(30), runner.run())
        .await
        .expect("probe failure should be quick")
        .unwrap_err();

    assert!(
        format!("{err:#}").contains("controller"),
        "failure should name the controller probe, got {err:#}"
    );
    assert_eq!(
        spawns.load(Ordering::SeqCst),
        0,
        "no source task may exist when startup validation fails"
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reachable_controller_probe_is_recorded_and_run_completes() -> Result<()> {
    init_tracing();
    let server = MockControllerServer::start().await?;
    let dir = tempfile::tempdir()?;
    let rulebook = write_rulebook(&dir, "run_job_template")?;

    let mut registry = SourceRegistry::new();
    register_scripted(&mut registry, "probe_src", tagged_events("a", &[1]));

    let config = RunConfig::builder()
        .rulebook(&rulebook)
        .controller(ControllerParams {
            url: Some(server.url().into()),
            token: Some("tok".into()),
            ..ControllerParams::default()
        })
        .shutdown_delay(Duration::from_millis(50))
        .build()?;

    let (engine, state) = RecordingEngine::new();
    let runner = Runner::with_registry(config, engine, registry);
    let outcome = timeout(Duration::from_secs(5), runner.run())
        .await
        .expect("run should complete")?;

    assert_eq!(outcome, RunOutcome::Completed);
    assert!(server.hits() >= 1, "the config probe must have been served");
    assert_eq!(state.lock().await.events.len(), 1);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn inventory_requiring_action_without_inventory_is_classified() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let rulebook = write_rulebook(&dir, "run_playbook")?;

    let mut registry = SourceRegistry::new();
    let spawns = register_scripted(&mut registry, "probe_src", tagged_events("a", &[1]));

    let config = RunConfig::builder().rulebook(&rulebook).build()?;
    let (engine, _state) = RecordingEngine::new();
    let runner = Runner::with_registry(config, engine, registry);

    let err = runner.run().await.unwrap_err();
    let classified = err
        .downcast_ref::<StartupError>()
        .expect("classified startup failure");
    assert!(matches!(classified, StartupError::InventoryNeeded { .. }));
    assert_eq!(spawns.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn configured_but_missing_inventory_is_classified() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let rulebook = write_rulebook(&dir, "run_module")?;

    let mut registry = SourceRegistry::new();
    register_scripted(&mut registry, "probe_src", tagged_events("a", &[1]));

    let config = RunConfig::builder()
        .rulebook(&rulebook)
        .inventory(dir.path().join("missing-inventory.ini"))
        .build()?;
    let (engine, _state) = RecordingEngine::new();
    let runner = Runner::with_registry(config, engine, registry);

    let err = runner.run().await.unwrap_err();
    let classified = err
        .downcast_ref::<StartupError>()
        .expect("classified startup failure");
    assert!(matches!(classified, StartupError::InventoryNotFound { .. }));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn controller_requiring_action_without_params_is_classified() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let rulebook = write_rulebook(&dir, "run_workflow_template")?;

    let mut registry = SourceRegistry::new();
    register_scripted(&mut registry, "probe_src", tagged_events("a", &[1]));

    let config = RunConfig::builder().rulebook(&rulebook).build()?;
    let (engine, _state) = RecordingEngine::new();
    let runner = Runner::with_registry(config, engine, registry);

    let err = runner.run().await.unwrap_err();
    let classified = err
        .downcast_ref::<StartupError>()
        .expect("classified startup failure");
    assert!(matches!(classified, StartupError::ControllerNeeded { .. }));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_mode_fetches_its_startup_bundle() -> Result<()> {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // One-shot workload server: validate the request, send the bundle.
    let server = tokio::spawn(async move {
        let (stream, _peer) = listener.accept().await.expect("worker connects");
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .expect("handshake");
        let (mut write, mut read) = ws.split();

        let request = loop {
            match read.next().await.expect("request frame").expect("frame ok") {
                Message::Text(text) => break text,
                _ => continue,
            }
        };
        let request: serde_json::Value = serde_json::from_str(&request).expect("request json");
        assert_eq!(request["type"], "Worker");
        assert_eq!(request["activation_id"], "act-42");

        let bundle = json!({
            "rulesets": [
                {"name": "remote", "sources": [{"type": "range", "config": {"limit": 1}}]}
            ],
            "variables": {"region": "eu-1"},
            "controller": {"token": "remote-token"}
        });
        write
            .send(Message::Text(bundle.to_string()))
            .await
            .expect("bundle sent");
    });

    let args = timeout(
        Duration::from_secs(5),
        request_workload(&format!("ws://{addr}"), "act-42"),
    )
    .await
    .expect("exchange should finish")?;

    assert_eq!(args.rulesets.len(), 1);
    assert_eq!(args.rulesets[0].name, "remote");
    assert_eq!(args.variables["region"], "eu-1");
    assert_eq!(args.controller.token.as_deref(), Some("remote-token"));
    server.await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_workload_exchange_is_classified() -> Result<()> {
    init_tracing();
    let err = request_workload("ws://127.0.0.1:9", "act-42")
        .await
        .unwrap_err();
    let classified = err
        .downcast_ref::<StartupError>()
        .expect("classified startup failure");
    assert!(matches!(classified, StartupError::WorkloadExchange { .. }));
    Ok(())
}
