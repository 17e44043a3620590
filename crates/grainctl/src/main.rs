//! grainctl: Command-line interface for grain state stores.
//!
//! Reads, writes and clears grain state in a grainstore SQLite database with
//! the same ETag checks a running host applies, and lists stored keys.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use grainstore::config::Config;
use grainstore::GrainId;

/// Command-line interface for grain state stores.
#[derive(Parser)]
#[command(name = "grainctl")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    storage: Config,

    /// State name recorded in logs and conflict errors
    #[arg(long, default_value = "state")]
    state_name: String,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    output: OutputFormat,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the grain state table if it does not exist
    Init,
    /// Read a grain's state, e.g. `grainctl read account/i:42`
    Read {
        /// Grain id as {type}/{shape}:{key}
        grain: GrainId,
    },
    /// Write a grain's state as JSON
    Write {
        /// Grain id as {type}/{shape}:{key}
        grain: GrainId,
        /// JSON state (or use --file, or stdin)
        state: Option<String>,
        /// Read JSON state from file
        #[arg(short, long)]
        file: Option<String>,
        /// ETag from the last read; omit for a grain never written
        #[arg(short, long)]
        etag: Option<String>,
    },
    /// Clear a grain's stored state
    Clear {
        /// Grain id as {type}/{shape}:{key}
        grain: GrainId,
        /// ETag from the last read; omit for a grain never written
        #[arg(short, long)]
        etag: Option<String>,
    },
    /// List stored grains and their versions
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    grainstore::observability::tracing::init_tracing(&cli.log_level, cli.json_logs);

    let options = cli.storage.storage_options();

    match cli.command {
        Commands::Init => commands::init::run(&options, cli.output).await?,
        Commands::Read { grain } => {
            commands::state::read(&options, &cli.state_name, &grain, cli.output).await?;
        }
        Commands::Write {
            grain,
            state,
            file,
            etag,
        } => {
            commands::state::write(&options, &cli.state_name, &grain, state, file, etag, cli.output)
                .await?;
        }
        Commands::Clear { grain, etag } => {
            commands::state::clear(&options, &cli.state_name, &grain, etag, cli.output).await?;
        }
        Commands::List => commands::list::run(&options, cli.output).await?,
    }

    Ok(())
}
