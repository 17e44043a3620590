//! Init command implementation.

use anyhow::Result;
use grainstore::config::StorageOptions;
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct InitOutput {
    provider: String,
    database: String,
}

pub async fn run(options: &StorageOptions, format: OutputFormat) -> Result<()> {
    let store = super::open_store(options).await?;

    let output = InitOutput {
        provider: store.name().to_string(),
        database: options.connection_string.clone(),
    };

    match format {
        OutputFormat::Text => {
            println!("Initialized {} ({})", output.database, output.provider);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
