//! Source registry and the built-in `range` and `tick` sources.

use crate::rules::model::SourceDeclaration;
use crate::sources::plugin::{EventSource, SendStatus, SourceContext, SourceFuture};
use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type SourceFactory =
    Arc<dyn Fn(&SourceDeclaration) -> Result<Box<dyn EventSource>> + Send + Sync>;

/// Maps source type names to plugin factories.
///
/// The supervisor resolves every declaration through a registry before any
/// task is spawned, so an unknown source type fails the run at startup
/// instead of inside a half-built pipeline.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: HashMap<String, SourceFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the bundled `range` and `tick` sources.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("range", |decl| Ok(Box::new(RangeSource::from_declaration(decl)?)));
        registry.register("tick", |decl| Ok(Box::new(TickSource::from_declaration(decl)?)));
        registry
    }

    pub fn register<F>(&mut self, source_type: impl Into<String>, factory: F)
    where
        F: Fn(&SourceDeclaration) -> Result<Box<dyn EventSource>> + Send + Sync + 'static,
    {
        self.factories.insert(source_type.into(), Arc::new(factory));
    }

    pub fn resolve(&self, declaration: &SourceDeclaration) -> Result<Box<dyn EventSource>> {
        let factory = self
            .factories
            .get(&declaration.source_type)
            .ok_or_else(|| anyhow!("unknown source type {:?}", declaration.source_type))?;
        factory(declaration)
            .with_context(|| format!("failed to build source {:?}", declaration.label()))
    }

    pub fn contains(&self, source_type: &str) -> bool {
        self.factories.contains_key(source_type)
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SourceRegistry").field("types", &names).finish()
    }
}

/// Emits `{"i": n}` for `n` in `0..limit`, optionally pacing each event.
#[derive(Debug)]
struct RangeSource {
    limit: u64,
    delay: Duration,
}

impl RangeSource {
    fn from_declaration(declaration: &SourceDeclaration) -> Result<Self> {
        let limit = declaration
            .config
            .get("limit")
            .and_then(serde_json::Value::as_u64)
            .context("range source requires a numeric 'limit'")?;
        let delay_ms = declaration
            .config
            .get("delay_ms")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0);
        Ok(Self {
            limit,
            delay: Duration::from_millis(delay_ms),
        })
    }
}

impl EventSource for RangeSource {
    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture {
        Box::pin(async move {
            for i in 0..self.limit {
                if !self.delay.is_zero() && !ctx.sleep(self.delay).await {
                    return Ok(());
                }
                if ctx.send_event(json!({ "i": i })).await == SendStatus::Cancelled {
                    return Ok(());
                }
            }
            Ok(())
        })
    }
}

/// Emits `{"tick": n}` every interval, forever unless a `limit` is set.
#[derive(Debug)]
struct TickSource {
    interval: Duration,
    limit: Option<u64>,
}

impl TickSource {
    fn from_declaration(declaration: &SourceDeclaration) -> Result<Self> {
        let interval_ms = declaration
            .config
            .get("interval_ms")
            .and_then(serde_json::Value::as_u64)
            .context("tick source requires a numeric 'interval_ms'")?;
        let limit = declaration
            .config
            .get("limit")
            .and_then(serde_json::Value::as_u64);
        Ok(Self {
            interval: Duration::from_millis(interval_ms.max(1)),
            limit,
        })
    }
}

impl EventSource for TickSource {
    fn run(self: Box<Self>, ctx: SourceContext) -> SourceFuture {
        Box::pin(async move {
            let mut tick = 0u64;
            loop {
                if let Some(limit) = self.limit {
                    if tick >= limit {
                        return Ok(());
                    }
                }
                if !ctx.sleep(self.interval).await {
                    return Ok(());
                }
                if ctx.send_event(json!({ "tick": tick })).await == SendStatus::Cancelled {
                    return Ok(());
                }
                tick += 1;
            }
        })
    }
}
