use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Event payload produced by a source and consumed by the rule engine.
pub type EventData = serde_json::Value;

/// Variable map shared by sources and the rule engine for one run.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Declaration of one event source feeding a rule group.
///
/// `source_type` selects the plugin in the registry; `config` is passed to
/// the plugin verbatim and never interpreted by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceDeclaration {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl SourceDeclaration {
    /// Display name used in logs and task labels.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.source_type)
    }
}

/// One action dispatched when a rule matches. Argument semantics belong to
/// the action runner, not to this runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    #[serde(rename = "action")]
    pub kind: String,
    #[serde(default)]
    pub args: serde_json::Map<String, serde_json::Value>,
}

/// A single rule: an opaque condition plus the actions it fires.
///
/// Condition semantics are owned by the rule engine collaborator; this
/// runtime only carries the value through.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub name: String,
    #[serde(default)]
    pub condition: serde_json::Value,
    #[serde(default)]
    pub actions: Vec<Action>,
}

/// A named set of rules sharing one event inbox and one or more sources.
/// Immutable once loaded for a given run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleGroup {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceDeclaration>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// A rule group paired with the receiving end of its event mailbox.
///
/// Exactly one of these exists per group; every source of the group holds a
/// clone of the corresponding sender. The channel capacity is 1 so a fast
/// producer suspends until the driver drains the previous event.
pub struct RuleGroupQueue {
    pub group: Arc<RuleGroup>,
    pub events: mpsc::Receiver<EventData>,
}

impl std::fmt::Debug for RuleGroupQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleGroupQueue")
            .field("group", &self.group.name)
            .finish_non_exhaustive()
    }
}
