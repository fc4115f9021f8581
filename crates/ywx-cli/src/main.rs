//! ywx command-line interface.
//!
//! Single-purpose conversion entry points: each subcommand takes one path,
//! converts it to its sibling in the other format, and prints `Done`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod collection;
mod convert;

#[derive(Parser)]
#[command(name = "ywx")]
#[command(
    author,
    version,
    about = "Convert novel projects between the yWriter 7 and novx file formats"
)]
struct Cli {
    /// Log codec progress to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a yWriter 7 project (`.yw7`) to a novx project (`.novx`).
    Convert {
        /// The `.yw7` project file.
        path: PathBuf,
    },

    /// Export a novx project (`.novx`) back to yWriter 7 (`.yw7`).
    Export {
        /// The `.novx` project file.
        path: PathBuf,
    },

    /// Upgrade a collection file (`.pwc`) to the current format (`.nvcx`),
    /// converting the referenced projects on demand.
    Collection {
        /// The `.pwc` collection file.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Convert { path } => {
            convert::yw7_to_novx(&path)?;
        }
        Commands::Export { path } => {
            convert::novx_to_yw7(&path)?;
        }
        Commands::Collection { path } => {
            collection::upgrade(&path)?;
        }
    }
    println!("Done");
    Ok(())
}
