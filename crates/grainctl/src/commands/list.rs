//! List command implementation.

use anyhow::{Context, Result};
use grainstore::config::StorageOptions;
use grainstore::storage::{BackingStore, SqliteStore};
use grainstore::GrainId;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct KeyOutput {
    grain: Option<String>,
    storage_key: String,
    version: i64,
    has_state: bool,
    updated_at: i64,
}

/// The `type/tag:body` form of a stored key, if it parses back to the same
/// grain. Type names containing `/` have no such form.
fn human_form(storage_key: &str) -> Option<String> {
    let id = match GrainId::from_storage_key(storage_key) {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(storage_key, error = %e, "Stored key is not a grain id");
            return None;
        }
    };
    let display = id.to_string();
    match display.parse::<GrainId>() {
        Ok(parsed) if parsed == id => Some(display),
        _ => None,
    }
}

pub async fn run(options: &StorageOptions, format: OutputFormat) -> Result<()> {
    let store = SqliteStore::open(options)
        .with_context(|| format!("failed to open {}", options.connection_string))?;
    store.initialize().await.context("failed to initialize grain storage")?;

    let keys = store.list_keys().await.context("failed to list keys")?;

    tracing::debug!(count = keys.len(), "Listed grain keys");

    // Rows written by other key encodings still get listed.
    let output: Vec<KeyOutput> = keys
        .into_iter()
        .map(|k| KeyOutput {
            grain: human_form(&k.grain_key),
            storage_key: k.grain_key,
            version: k.version,
            has_state: k.has_payload,
            updated_at: k.updated_at,
        })
        .collect();

    match format {
        OutputFormat::Text => {
            if output.is_empty() {
                println!("No grains stored");
            } else {
                println!("{:<40} {:>8} {:>6}", "GRAIN", "VERSION", "STATE");
                println!("{}", "-".repeat(56));
                for key in &output {
                    println!(
                        "{:<40} {:>8} {:>6}",
                        key.grain.as_deref().unwrap_or(&key.storage_key),
                        key.version,
                        if key.has_state { "yes" } else { "no" }
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_form_round_trips() {
        let id = GrainId::from_integer("cart", 7);
        assert_eq!(human_form(&id.storage_key()).as_deref(), Some("cart/i:7"));
    }

    #[test]
    fn test_ambiguous_type_name_has_no_human_form() {
        let id = GrainId::from_string("a/s:b", "c");
        assert_eq!(human_form(&id.storage_key()), None);
    }

    #[test]
    fn test_foreign_key_has_no_human_form() {
        assert_eq!(human_form("legacy-key-42"), None);
    }
}
