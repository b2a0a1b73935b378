//! bucketview CLI
//!
//! Browse and edit a bucket store file from the command line.

use bucketview::{Explorer, ExplorerConfig, Pair, StoreError};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

/// bucketview
#[derive(Parser, Debug)]
#[command(name = "bucketview")]
#[command(about = "Browse and edit a single-file bucket store")]
#[command(version)]
struct Args {
    /// Store file
    db: PathBuf,

    /// Compiled protobuf descriptor sets used to decode values
    #[arg(long = "proto-files", value_delimiter = ',')]
    proto_files: Vec<PathBuf>,

    /// Full message type name of stored values (e.g. acme.weather.v1.Units)
    #[arg(long = "proto-type")]
    proto_type: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the children of a bucket
    Ls {
        /// Bucket path, one segment per flag (root when omitted)
        #[arg(short, long)]
        level: Vec<String>,

        /// Case-insensitive name filter
        #[arg(short, long, default_value = "")]
        search: String,
    },

    /// Create buckets
    Mkdir {
        #[arg(short, long)]
        level: Vec<String>,

        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Store a key with a JSON value
    Put {
        #[arg(short, long, required = true)]
        level: Vec<String>,

        key: String,

        /// JSON value; bare words are stored as strings
        value: String,
    },

    /// Delete a bucket or key
    Rm {
        #[arg(short, long)]
        level: Vec<String>,

        name: String,
    },

    /// Rename a key
    Mv {
        #[arg(short, long, required = true)]
        level: Vec<String>,

        old_key: String,

        new_key: String,
    },

    /// Replace the value of an existing key
    Set {
        #[arg(short, long, required = true)]
        level: Vec<String>,

        key: String,

        value: String,
    },

    /// Rewrite the store file without history
    Compact,

    /// Show store statistics
    Stats,
}

fn main() {
    let args = Args::parse();

    // Initialize tracing/logging
    let default_filter = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), StoreError> {
    let mut config = ExplorerConfig::new(&args.db);
    config.descriptor_sets = args.proto_files;
    config.message_type = args.proto_type;

    let mut explorer = Explorer::open(config)?;

    match args.command {
        Commands::Ls { level, search } => print(&explorer.list(&level, &search)?)?,
        Commands::Mkdir { level, names } => {
            explorer.create_buckets(&level, &names)?;
            print(&"Buckets added successfully")?;
        }
        Commands::Put { level, key, value } => {
            explorer.add_pairs(&level, &[Pair::new(key, parse_value(&value))])?;
            print(&"Pairs added successfully")?;
        }
        Commands::Rm { level, name } => {
            explorer.delete(&level, &name)?;
            print(&"Deleted successfully")?;
        }
        Commands::Mv {
            level,
            old_key,
            new_key,
        } => {
            explorer.rename(&level, &old_key, &new_key)?;
            print(&"Renamed successfully")?;
        }
        Commands::Set { level, key, value } => {
            explorer.update_value(&level, &key, &parse_value(&value))?;
            print(&"Updated pair value successfully")?;
        }
        Commands::Compact => {
            explorer.compact()?;
            print(&explorer.stats()?)?;
        }
        Commands::Stats => print(&explorer.stats()?)?,
    }

    explorer.close()
}

/// Parse a JSON value, falling back to a plain string.
fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn print(value: &impl Serialize) -> Result<(), StoreError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
