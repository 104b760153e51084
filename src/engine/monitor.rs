//! Rulebook change detection for the hot-reload path.

use anyhow::{Context, Result};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// Watches the rulebook file and raises a one-way reload flag when it
/// changes.
///
/// This struct keeps the underlying `RecommendedWatcher` alive; dropping it
/// stops file watching. The parent directory is watched (non-recursively)
/// rather than the file itself so editor save strategies that replace the
/// file are still observed.
pub struct RulebookMonitor {
    _watcher: RecommendedWatcher,
    reload_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for RulebookMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RulebookMonitor").finish_non_exhaustive()
    }
}

impl RulebookMonitor {
    pub fn spawn(rulebook: &Path) -> Result<Self> {
        let rulebook = rulebook
            .canonicalize()
            .with_context(|| format!("cannot monitor {}", rulebook.display()))?;
        let watch_dir = rulebook
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let (reload_tx, reload_rx) = watch::channel(false);
        let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<Event>();

        // Closure called synchronously by notify whenever an event arrives.
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let _ = event_tx.send(event);
                }
                Err(err) => {
                    eprintln!("ruleflow: file watch error: {err}");
                }
            },
            Config::default(),
        )
        .context("failed to create file watcher")?;

        watcher
            .watch(&watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", watch_dir.display()))?;

        tracing::info!(rulebook = %rulebook.display(), "monitoring rulebook for changes");

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let touched = event
                    .paths
                    .iter()
                    .any(|path| path == &rulebook || path.file_name() == rulebook.file_name());
                if touched {
                    tracing::warn!(rulebook = %rulebook.display(), "rulebook file changed");
                    if reload_tx.send(true).is_err() {
                        return;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            reload_rx,
        })
    }

    /// Receiver that flips to `true` once the rulebook changed. The flag is
    /// never lowered within a run; reload is a full restart.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.reload_rx.clone()
    }
}
