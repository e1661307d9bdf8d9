//! Weave CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Incremental project graph for multi-project workspaces", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Workspace root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the project graph
    Graph {
        /// Print the graph as JSON
        #[arg(long)]
        json: bool,

        /// Ignore and do not rely on the previous build's file map
        #[arg(long)]
        no_cache: bool,

        /// Running as one of several parallel builds; no progress display
        #[arg(long)]
        parallel: bool,
    },
    /// Report plugins that fail on the projects under a directory
    Probe {
        /// Directory, relative to the root, to probe
        subtree: PathBuf,

        /// Plugins to probe (defaults to the configured ones)
        #[arg(short, long)]
        plugin: Vec<String>,
    },
    /// Probe a directory and exclude its incompatible files in weave.json
    Exclude {
        /// Directory, relative to the root, to probe
        subtree: PathBuf,
    },
    /// Clear the cache
    Clear,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("weave={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Weave v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Workspace root: {}", cli.root.display());

    match cli.command {
        Commands::Graph { json, no_cache, parallel } => {
            commands::graph(cli.root, json, !no_cache, parallel).await
        }
        Commands::Probe { subtree, plugin } => {
            commands::probe(cli.root, subtree, plugin).await
        }
        Commands::Exclude { subtree } => {
            commands::exclude(cli.root, subtree).await
        }
        Commands::Clear => {
            commands::clear(cli.root)
        }
        Commands::Version => {
            println!("Weave v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
