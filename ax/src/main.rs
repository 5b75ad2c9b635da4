//! AnchorSync - spatial-anchor synchronization
//!
//! CLI entry point: loopback protocol runs and cache management.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use anchorsync::cli::{CacheCommand, Cli, Command, OutputFormat};
use anchorsync::config::Config;
use anchorsync::coordinator::{AnchorState, Coordinator, CoordinatorHandle};
use anchorsync::platform::MemoryStoreProvider;
use anchorsync::sim::{SharingHub, SimParticipant, SimSession};
use anchorstore::AnchorStore;

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("anchorsync")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    let log_file = fs::File::create(log_dir.join("anchorsync.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!(
        "AnchorSync loaded config: room={}, room-id={}",
        config.coordinator.room_name, config.coordinator.room_id
    );

    match cli.command {
        Command::Run { peers, timeout } => cmd_run(&config, peers, timeout).await,
        Command::Status { format } => cmd_status(&config, format),
        Command::Cache { command } => match command {
            CacheCommand::List { format } => cmd_cache_list(&config, format),
            CacheCommand::Clear => cmd_cache_clear(&config),
        },
    }
}

fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_cache(config)?;
    let entries = store.entries()?;
    let total_bytes: usize = entries.iter().map(|e| e.size).sum();

    match format {
        OutputFormat::Json => {
            let status = serde_json::json!({
                "room-name": &config.coordinator.room_name,
                "room-id": config.coordinator.room_id,
                "keep-room-alive": config.coordinator.keep_room_alive,
                "min-trustworthy-anchor-bytes": config.coordinator.min_trustworthy_anchor_bytes,
                "cache-path": &config.storage.cache_path,
                "cached-anchors": entries.len(),
                "cached-bytes": total_bytes,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Text => {
            println!("{}: {} (id {})", "room".bold(), config.coordinator.room_name, config.coordinator.room_id);
            println!("{}: {}", "keep-room-alive".bold(), config.coordinator.keep_room_alive);
            println!(
                "{}: {} bytes",
                "min-trustworthy-anchor-size".bold(),
                config.coordinator.min_trustworthy_anchor_bytes
            );
            println!("{}: {}", "cache".bold(), config.storage.cache_path.display());
            println!("{}: {} anchor(s), {} bytes", "cached".bold(), entries.len(), total_bytes);
        }
    }
    Ok(())
}

/// Run a loopback session on an in-process hub
async fn cmd_run(config: &Config, peers: usize, timeout: u64) -> Result<()> {
    let peers = peers.max(1);
    println!(
        "Starting loopback session: {} participant(s) in room {}",
        peers,
        config.coordinator.room_name.bold()
    );

    let hub = SharingHub::new();
    let mut handles: Vec<(i64, CoordinatorHandle)> = Vec::new();
    let mut sessions: Vec<Arc<SimSession>> = Vec::new();
    let mut tasks = Vec::new();

    for i in 0..peers {
        let user_id = (i as i64) + 1;
        let participant = SimParticipant::new(&hub, user_id);
        let collab = participant.collaborators(Arc::new(MemoryStoreProvider));
        let coordinator = Coordinator::new(config.coordinator.clone(), collab);
        let handle = coordinator.handle();

        // Narrate state transitions per participant
        let mut changes = handle.subscribe_states();
        tokio::spawn(async move {
            while let Ok(change) = changes.recv().await {
                println!("{} {} -> {}", format!("[peer {user_id}]").dimmed(), change.from, change.to);
            }
        });

        sessions.push(participant.session.clone());
        tasks.push(tokio::spawn(coordinator.run()));
        handles.push((user_id, handle));
    }

    for session in &sessions {
        session.connect_manager();
        session.join();
    }

    // Wait until every participant settles in Ready
    let deadline = tokio::time::Instant::now() + Duration::from_secs(timeout);
    loop {
        let mut all_ready = true;
        for (_, handle) in &handles {
            if handle.status().await?.state != AnchorState::Ready {
                all_ready = false;
                break;
            }
        }
        if all_ready {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            eyre::bail!("timed out waiting for {peers} participant(s) to reach Ready");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    println!("{}", "All participants Ready".green().bold());
    for (user_id, handle) in &handles {
        let status = handle.status().await?;
        println!(
            "  peer {user_id}: {} (configured: {}, local-anchor: {})",
            status.state, status.flags.anchor_configured, status.flags.local_anchor
        );
    }

    for (_, handle) in &handles {
        handle.shutdown().await?;
    }
    futures::future::join_all(tasks).await;

    Ok(())
}

fn open_cache(config: &Config) -> Result<AnchorStore> {
    let path = &config.storage.cache_path;
    AnchorStore::open(path).context(format!("Failed to open cache at {}", path.display()))
}

fn cmd_cache_list(config: &Config, format: OutputFormat) -> Result<()> {
    let store = open_cache(config)?;
    let entries = store.entries()?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("{}", "No cached anchors".dimmed());
            }
            for entry in entries {
                println!("{:<38} {:>10} B  {}", entry.name, entry.size, entry.created_at.format("%Y-%m-%d %H:%M:%S"));
            }
        }
    }
    Ok(())
}

fn cmd_cache_clear(config: &Config) -> Result<()> {
    let store = open_cache(config)?;
    let removed = store.clear()?;
    println!("{} {} cached anchor(s)", "Removed".green(), removed);
    Ok(())
}
