//! AnchorStore CLI - inspect and manage the local anchor cache

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use eyre::{Context, Result};

use anchorstore::{AnchorStore, default_store_path};

/// Anchor cache inspector
#[derive(Parser)]
#[command(name = "anchorstore", about = "Inspect and manage the local anchor blob cache")]
struct Cli {
    /// Path to the store database
    #[arg(short, long, global = true)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List cached anchors
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show one cached anchor's metadata
    Show {
        /// Anchor name
        name: String,
    },

    /// Remove one cached anchor
    Remove {
        /// Anchor name
        name: String,
    },

    /// Remove every cached anchor
    Clear,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.path.unwrap_or_else(default_store_path);
    let store = AnchorStore::open(&path).context(format!("Failed to open store at {}", path.display()))?;

    match cli.command {
        Command::List { format } => cmd_list(&store, format),
        Command::Show { name } => cmd_show(&store, &name),
        Command::Remove { name } => cmd_remove(&store, &name),
        Command::Clear => cmd_clear(&store),
    }
}

fn cmd_list(store: &AnchorStore, format: OutputFormat) -> Result<()> {
    let entries = store.entries()?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("{}", "No cached anchors".dimmed());
                return Ok(());
            }

            println!("{:<38} {:>12}  {}", "NAME".bold(), "SIZE".bold(), "CACHED".bold());
            for entry in entries {
                println!(
                    "{:<38} {:>12}  {}",
                    entry.name,
                    format!("{} B", entry.size),
                    entry.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
    }

    Ok(())
}

fn cmd_show(store: &AnchorStore, name: &str) -> Result<()> {
    match store.load(name)? {
        Some(payload) => {
            println!("{}: {}", "name".bold(), name);
            println!("{}: {} bytes", "size".bold(), payload.len());
            Ok(())
        }
        None => {
            println!("{} {}", "Not cached:".red(), name);
            std::process::exit(1);
        }
    }
}

fn cmd_remove(store: &AnchorStore, name: &str) -> Result<()> {
    if store.remove(name)? {
        println!("{} {}", "Removed".green(), name);
    } else {
        println!("{} {}", "Not cached:".yellow(), name);
    }
    Ok(())
}

fn cmd_clear(store: &AnchorStore) -> Result<()> {
    let removed = store.clear()?;
    println!("{} {} cached anchor(s)", "Removed".green(), removed);
    Ok(())
}
