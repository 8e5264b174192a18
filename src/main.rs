//! # Chat Graph CLI (`cgraph`)
//!
//! The `cgraph` binary drives the pipeline that turns one week of a Telegram
//! chat into a SIOC graph: extract raw messages, canonicalize them, fold them
//! into a graph document, write Turtle, and load it into a triple store.
//!
//! ## Usage
//!
//! ```bash
//! cgraph --config ./config/cgraph.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cgraph extract` | Pull the last N days of a chat from the configured source |
//! | `cgraph canonicalize` | Raw JSON lines to canonical records |
//! | `cgraph build` | Canonical records to a graph document |
//! | `cgraph rdf` | Graph document to Turtle |
//! | `cgraph load` | Load Turtle into the triple store |
//! | `cgraph count` | Print the number of triples in the store |
//! | `cgraph stats` | Summarize a graph document |
//! | `cgraph run` | Canonicalize, build, write RDF, and load in one go |
//!
//! Every file argument defaults to the matching `[paths]` entry.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use chat_graph::config::{self, Config};
use chat_graph::{canonicalize, extract, graph, rdf, stats, store};

/// Chat Graph CLI: Telegram chat history to a SIOC knowledge graph.
#[derive(Parser)]
#[command(
    name = "cgraph",
    about = "Turn a week of Telegram chat history into a SIOC RDF graph",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/cgraph.toml`. Built-in defaults are used when
    /// the file does not exist.
    #[arg(long, global = true, default_value = "./config/cgraph.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract raw messages for one chat.
    Extract {
        /// Chat id, username, or invite link. Overrides `extract.entity`.
        #[arg(long)]
        entity: Option<String>,

        /// Window size in days. Overrides `extract.window_days`.
        #[arg(long)]
        days: Option<i64>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Canonicalize raw messages.
    ///
    /// Records without a chat id, message id, or timestamp are dropped and
    /// counted; malformed lines are skipped.
    Canonicalize {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Build the graph document from canonical records.
    ///
    /// Fails without writing anything if no record belongs to the target chat.
    Build {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Write the graph document as Turtle.
    Rdf {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Load a Turtle file into the triple store.
    Load {
        #[arg(long)]
        input: Option<PathBuf>,

        /// Store directory. Overrides `store.dir`.
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Print the number of triples in the store.
    Count {
        #[arg(long)]
        store: Option<PathBuf>,
    },

    /// Summarize a graph document.
    Stats {
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Run canonicalize, build, rdf, and load back to back.
    Run {
        /// Extract from the configured source first.
        #[arg(long)]
        extract: bool,

        /// Stop after writing Turtle.
        #[arg(long)]
        skip_load: bool,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_graph=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::debug!(config = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn or_default(path: Option<PathBuf>, default: &Path) -> PathBuf {
    path.unwrap_or_else(|| default.to_path_buf())
}

fn report_canonicalize(stats: &canonicalize::CanonicalizeStats) {
    println!(
        "Read {} lines, wrote {} canonical messages ({} dropped)",
        stats.read,
        stats.written,
        stats.dropped()
    );
}

fn report_build(report: &graph::BuildReport) {
    println!(
        "Wrote {} posts, {} users, {} links",
        report.posts, report.users, report.links
    );
    if report.skipped_foreign > 0 || report.rejected > 0 {
        println!(
            "Skipped {} records from other chats, rejected {} invalid records",
            report.skipped_foreign, report.rejected
        );
    }
    if report.degraded > 0 {
        println!("Dropped {} unusable fields", report.degraded);
    }
}

fn report_load(report: &store::LoadReport) {
    println!(
        "Loaded {} triples ({} new). Triple count: {}",
        report.parsed, report.inserted, report.total
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = load_or_default(&cli.config)?;
    let paths = &cfg.paths;

    match cli.command {
        Commands::Extract {
            entity,
            days,
            output,
        } => {
            let output = or_default(output, &paths.raw);
            let n = extract::run_extract(&cfg, entity.as_deref(), days, &output).await?;
            println!("Extracted {} messages to {}", n, output.display());
        }
        Commands::Canonicalize { input, output } => {
            let input = or_default(input, &paths.raw);
            let output = or_default(output, &paths.canonical);
            let stats = canonicalize::run_canonicalize(&cfg, &input, &output)?;
            report_canonicalize(&stats);
        }
        Commands::Build { input, output } => {
            let input = or_default(input, &paths.canonical);
            let output = or_default(output, &paths.graph);
            let report = graph::run_build(&cfg, &input, &output)?;
            report_build(&report);
        }
        Commands::Rdf { input, output } => {
            let input = or_default(input, &paths.graph);
            let output = or_default(output, &paths.rdf);
            let n = rdf::run_rdf(&cfg, &input, &output)?;
            println!("Wrote {} triples to {}", n, output.display());
        }
        Commands::Load { input, store: dir } => {
            let input = or_default(input, &paths.rdf);
            let dir = or_default(dir, &cfg.store.dir);
            let report = store::load_turtle(&dir, &input).await?;
            report_load(&report);
        }
        Commands::Count { store: dir } => {
            let dir = or_default(dir, &cfg.store.dir);
            let n = store::count_triples(&dir).await?;
            println!("Triple count: {}", n);
        }
        Commands::Stats { input } => {
            let input = or_default(input, &paths.graph);
            stats::run_stats(&cfg, &input).await?;
        }
        Commands::Run {
            extract: with_extract,
            skip_load,
        } => {
            if with_extract {
                let n = extract::run_extract(&cfg, None, None, &paths.raw).await?;
                println!("Extracted {} messages", n);
            }
            let stats = canonicalize::run_canonicalize(&cfg, &paths.raw, &paths.canonical)?;
            report_canonicalize(&stats);

            let report = graph::run_build(&cfg, &paths.canonical, &paths.graph)?;
            report_build(&report);

            let n = rdf::run_rdf(&cfg, &paths.graph, &paths.rdf)?;
            println!("Wrote {} triples to {}", n, paths.rdf.display());

            if !skip_load {
                let report = store::run_load(&cfg, &paths.rdf).await?;
                report_load(&report);
            }
        }
    }

    Ok(())
}
