//! Marker-level surface of the external vault collaborator.
//!
//! Decryption itself happens outside this runtime; the startup validator
//! only needs to know whether raw rulebook bytes contain vaulted payloads
//! and whether a structured value still carries ciphertext that would leak
//! into action arguments or exported variables.

use anyhow::{bail, Result};
use serde_json::Value;

/// Header prefix emitted by the vault tool for every encrypted payload.
pub const VAULT_MARKER: &str = "$VAULT;";

/// Returns true when the raw rulebook bytes contain at least one vaulted
/// payload.
pub fn has_vaulted_str(raw: &[u8]) -> bool {
    raw.windows(VAULT_MARKER.len())
        .any(|window| window == VAULT_MARKER.as_bytes())
}

/// Fails when `value` (or anything nested inside it) still carries a vault
/// header, i.e. ciphertext that the decryption collaborator did not resolve.
pub fn ensure_decryptable(location: &str, value: &Value) -> Result<()> {
    match value {
        Value::String(text) => {
            if text.trim_start().starts_with(VAULT_MARKER) {
                bail!("undecryptable vaulted value at {location}");
            }
            Ok(())
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                ensure_decryptable(&format!("{location}[{index}]"), item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, item) in map {
                ensure_decryptable(&format!("{location}.{key}"), item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
