//! Loading of rulebooks and variable files from the local filesystem.
//!
//! Rulebooks arrive as already-structured documents; schema validation and
//! alternate encodings are owned by the parsing collaborator upstream of
//! this runtime. Collection-style rulebook references are not supported.

use crate::rules::model::{RuleGroup, Variables};
use crate::rules::vault::has_vaulted_str;
use crate::runtime::validate::StartupError;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Loads the variables file (a JSON object) and merges the comma-separated
/// environment pass-through list on top of it.
///
/// Every name in `env_passthrough` must exist in the process environment;
/// a missing name is a startup failure, not a silent default.
pub fn load_vars(
    vars_file: Option<&Path>,
    env_passthrough: Option<&str>,
) -> Result<Variables> {
    let mut variables = Variables::new();

    if let Some(path) = vars_file {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read variables file {}", path.display()))?;
        let loaded: Variables = serde_json::from_slice(&raw)
            .with_context(|| format!("variables file {} is not a JSON object", path.display()))?;
        variables.extend(loaded);
    }

    if let Some(names) = env_passthrough {
        for name in names.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = std::env::var(name)
                .with_context(|| format!("could not find environment variable {name:?}"))?;
            variables.insert(name.to_owned(), Value::String(value));
        }
    }

    Ok(variables)
}

/// Loads and parses the rulebook at `path`.
///
/// Returns the rule groups plus a flag indicating whether the raw bytes
/// contained vaulted payloads, which the startup validator turns into a
/// decryptability check on action arguments and variables.
pub fn load_rulebook(path: &Path) -> Result<(Vec<Arc<RuleGroup>>, bool)> {
    if !path.exists() {
        return Err(StartupError::RulebookNotFound {
            path: path.to_path_buf(),
        }
        .into());
    }

    tracing::debug!(rulebook = %path.display(), "loading rules from the file system");
    let raw = std::fs::read(path)
        .with_context(|| format!("failed to read rulebook {}", path.display()))?;
    let vaulted = has_vaulted_str(&raw);
    let groups: Vec<RuleGroup> = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse rulebook {}", path.display()))?;

    Ok((groups.into_iter().map(Arc::new).collect(), vaulted))
}

/// Substitutes `${name}` references in every value of `env` from the
/// variable map. An unresolved reference fails the run before any task
/// observes a half-substituted environment.
pub fn substitute_variables(
    env: &HashMap<String, String>,
    variables: &Variables,
) -> Result<HashMap<String, String>> {
    let mut substituted = HashMap::with_capacity(env.len());
    for (key, template) in env {
        substituted.insert(key.clone(), substitute_one(template, variables)?);
    }
    Ok(substituted)
}

fn substitute_one(template: &str, variables: &Variables) -> Result<String> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let Some(end) = tail.find('}') else {
            bail!("unterminated variable reference in {template:?}");
        };
        let name = &tail[..end];
        let Some(value) = variables.get(name) else {
            bail!("undefined variable {name:?} referenced in {template:?}");
        };
        output.push_str(&value_as_env_string(value));
        rest = &tail[end + 1..];
    }

    output.push_str(rest);
    Ok(output)
}

fn value_as_env_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
