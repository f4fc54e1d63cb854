//! SparseKV CLI
//!
//! Opens a data directory and runs one command against it.

use std::process;

use clap::{Parser, Subcommand};
use sparsekv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// SparseKV CLI
#[derive(Parser, Debug)]
#[command(name = "sparsekv-cli")]
#[command(about = "Embedded log-structured key-value store")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./sparsekv_data")]
    data_dir: String,

    /// Distinct keys per memtable before a flush
    #[arg(short, long, default_value = "4096")]
    threshold: usize,

    /// Sparse index block size in bytes
    #[arg(short, long, default_value = "4096")]
    block_size: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Merge the two oldest segments
    Compact {
        /// Keep merging until one segment remains
        #[arg(long)]
        all: bool,
    },

    /// List segments with their size and index breakpoints
    Segments,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sparsekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> sparsekv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .memtable_threshold(args.threshold)
        .index_block_size(args.block_size)
        .build();

    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { key } => match engine.get(key.as_bytes())? {
            Some(value) => println!("{}", String::from_utf8_lossy(&value)),
            None => {
                println!("(not found)");
            }
        },
        Commands::Set { key, value } => {
            if sparsekv::codec::contains_delimiter(key.as_bytes())
                || sparsekv::codec::contains_delimiter(value.as_bytes())
            {
                return Err(sparsekv::KvError::Config(
                    "keys and values must not contain bytes 0x1E or 0x1F".to_string(),
                ));
            }
            engine.set(key.as_bytes(), value.as_bytes())?;
            println!("OK");
        }
        Commands::Compact { all } => {
            let merges = if all {
                engine.compact_all()?
            } else {
                usize::from(engine.compact()?)
            };
            println!("{} merge(s), {} segment(s) left", merges, engine.segment_count());
        }
        Commands::Segments => {
            for entry in engine.segments().segments() {
                println!(
                    "{:>8}  {:>10} bytes  {:>6} breakpoints",
                    entry.segment().name(),
                    entry.segment().size(),
                    entry.index().len()
                );
            }
        }
    }

    engine.close()
}
