//! Copse CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "copse")]
#[command(about = "Copy object graphs with declarative, per-type copy rules", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the subgraph under a root record and print the copy
    Copy {
        /// Copy plan (YAML, TOML or JSON)
        #[arg(short, long)]
        plan: PathBuf,

        /// Graph document holding the source records (JSON or YAML)
        #[arg(short, long)]
        graph: PathBuf,

        /// Label of the root record in the graph document
        #[arg(short, long)]
        root: String,

        /// Copier for the root; defaults to the plan's root copier, then to
        /// the copier registered for the root's type
        #[arg(short, long)]
        copier: Option<String>,

        /// Write the copied subgraph here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Validate a copy plan, optionally against a graph document's schema
    Check {
        #[arg(short, long)]
        plan: PathBuf,

        #[arg(short, long)]
        graph: Option<PathBuf>,
    },
    /// Show the records reachable from a root
    Inspect {
        #[arg(short, long)]
        graph: PathBuf,

        #[arg(short, long)]
        root: String,

        /// Print Graphviz DOT instead of a listing
        #[arg(long)]
        dot: bool,
    },
    /// Show version
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "copse={log_level},copse_core={log_level},copse_store={log_level}"
        )))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Copy {
            plan,
            graph,
            root,
            copier,
            out,
        } => commands::copy(&plan, &graph, &root, copier, out.as_deref()),
        Commands::Check { plan, graph } => commands::check(&plan, graph.as_deref()),
        Commands::Inspect { graph, root, dot } => commands::inspect(&graph, &root, dot),
        Commands::Version => {
            println!("Copse v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
