//! Read, write and clear command implementations.

use std::fs;

use anyhow::{anyhow, Context, Result};
use grainstore::config::StorageOptions;
use grainstore::{GrainId, GrainState, StorageError};
use serde::Serialize;
use serde_json::Value;

use crate::OutputFormat;

#[derive(Serialize)]
struct StateOutput {
    grain: String,
    etag: Option<String>,
    record_exists: bool,
    state: Value,
}

impl StateOutput {
    fn new(grain: &GrainId, grain_state: GrainState<Value>) -> Self {
        Self {
            grain: grain.to_string(),
            etag: grain_state.etag,
            record_exists: grain_state.record_exists,
            state: grain_state.state,
        }
    }

    fn print(&self, action: &str, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Text => {
                println!("{} '{}'", action, self.grain);
                println!("  ETag: {}", self.etag.as_deref().unwrap_or("-"));
                println!("  Record exists: {}", self.record_exists);
                if self.record_exists {
                    println!("  State: {}", serde_json::to_string(&self.state)?);
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(self)?);
            }
        }
        Ok(())
    }
}

/// Conflicts get a hint; everything else keeps its own message.
fn explain(error: StorageError, action: &str) -> anyhow::Error {
    if error.is_conflict() {
        anyhow!(error).context(format!(
            "{} rejected: the ETag is stale; read the grain again and retry with its current ETag",
            action
        ))
    } else {
        anyhow!(error).context(format!("{} failed", action))
    }
}

pub async fn read(
    options: &StorageOptions,
    state_name: &str,
    grain: &GrainId,
    format: OutputFormat,
) -> Result<()> {
    let store = super::open_store(options).await?;

    let mut grain_state = GrainState::<Value>::default();
    store
        .read_state(state_name, grain, &mut grain_state)
        .await
        .map_err(|e| explain(e, "read"))?;

    StateOutput::new(grain, grain_state).print("Read", format)
}

pub async fn write(
    options: &StorageOptions,
    state_name: &str,
    grain: &GrainId,
    state: Option<String>,
    file: Option<String>,
    etag: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let raw = match (state, file) {
        (Some(s), None) => s,
        (None, Some(f)) => {
            fs::read_to_string(&f).with_context(|| format!("failed to read file: {}", f))?
        }
        (Some(_), Some(_)) => {
            return Err(anyhow!("cannot specify both state and --file"));
        }
        (None, None) => {
            use std::io::{self, Read};
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read from stdin")?;
            buffer
        }
    };
    let value: Value = serde_json::from_str(&raw).context("state is not valid JSON")?;

    let store = super::open_store(options).await?;

    let mut grain_state = GrainState::new(value);
    grain_state.etag = etag;
    store
        .write_state(state_name, grain, &mut grain_state)
        .await
        .map_err(|e| explain(e, "write"))?;

    StateOutput::new(grain, grain_state).print("Wrote", format)
}

pub async fn clear(
    options: &StorageOptions,
    state_name: &str,
    grain: &GrainId,
    etag: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let store = super::open_store(options).await?;

    let mut grain_state = GrainState::<Value>::default();
    grain_state.etag = etag;
    store
        .clear_state(state_name, grain, &mut grain_state)
        .await
        .map_err(|e| explain(e, "clear"))?;

    StateOutput::new(grain, grain_state).print("Cleared", format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_gets_hint() {
        let err = StorageError::InconsistentState {
            operation: grainstore::error::Operation::Write,
            provider: "Default".into(),
            state_name: "state".into(),
            grain_key: "4:cart/i:1".into(),
            etag: "3".into(),
        };
        let message = format!("{:#}", explain(err, "write"));
        assert!(message.starts_with("write rejected"));
        assert!(message.contains("ETag=3"));
    }

    #[test]
    fn test_other_errors_keep_message() {
        let message = format!("{:#}", explain(StorageError::Cancelled, "read"));
        assert!(message.starts_with("read failed"));
    }
}
