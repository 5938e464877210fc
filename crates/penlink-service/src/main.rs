//! penlinkd - download drawings from BLE smartpens.
//!
//! Run with: `cargo run -p penlink-service -- --listen`

use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use penlink_core::{Agent, AgentCommand, BtleplugTransport};
use penlink_service::{Config, NotificationProbe, default_config_path, print_events};

/// penlinkd - host agent for BLE smartpens.
#[derive(Parser, Debug)]
#[command(name = "penlinkd")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start discovery on every adapter.
    #[arg(short, long)]
    listen: bool,

    /// Verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Trace logging; implies --listen.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration; a broken default file is reported once logging is up
    let (config, load_error) = match &args.config {
        Some(path) => (Config::load(path)?, None),
        None => Config::load_or_default(default_config_path()),
    };

    // Initialize logging
    config
        .logging
        .to_log_config()
        .verbose(args.verbose)
        .debug(args.debug)
        .init()?;

    if let Some(e) = load_error {
        warn!(error = %e, "Ignoring default config file, using defaults");
    }

    config.validate()?;

    let mut agent_config = config.agent.to_agent_config();
    if args.listen || args.debug {
        agent_config = agent_config.listen(true);
    }

    let (transport, transport_events) = BtleplugTransport::new().await?;
    let agent = Agent::new(agent_config, transport.shared(), NotificationProbe::boxed)?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupted, shutting down"),
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c"),
        }
        shutdown.cancel();
    });

    let output = tokio::spawn(print_events(agent.subscribe(), config.output.format));

    // Keep the sender alive so the command arm stays pending.
    let (_commands_tx, commands) = mpsc::channel::<AgentCommand>(16);

    transport.start(cancel.clone()).await?;
    agent.run(transport_events, commands, cancel).await;

    // The agent owned the only event sender; the printer drains and exits.
    output.await?;
    Ok(())
}
