//! Strand node.
//!
//! Without a target the node prints its address and serves `/echo/1.0.0`
//! until Ctrl-C. With `-d <peer-address>` it sends one line to that peer,
//! prints the reply and exits.

mod config;

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use strand_core::Keypair;
use strand_net::{echo, EchoHandler, Host, PeerRecord};
use strand_proto::{PeerAddress, ProtocolId};

use crate::config::{NodeConfig, Overrides, DEFAULT_CONFIG_PATH};

const MESSAGE: &[u8] = b"Hello, world!\n";

/// Minimal peer-to-peer echo node.
#[derive(Parser)]
#[command(name = "strand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on [default: 4001]
    #[arg(short = 'l', long)]
    listen_port: Option<u16>,

    /// Interface to listen on [default: 127.0.0.1]
    #[arg(long)]
    listen_host: Option<IpAddr>,

    /// Peer address to send one echo to, then exit
    #[arg(short = 'd', long)]
    target: Option<PeerAddress>,

    /// Use plaintext streams instead of Noise
    #[arg(long)]
    insecure: bool,

    /// Deterministic key seed (0 = random)
    #[arg(long)]
    seed: Option<u64>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;

    let explicit = cli.config.is_some();
    let path = cli
        .config
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let overrides = Overrides {
        listen_host: cli.listen_host,
        listen_port: cli.listen_port,
        target: cli.target,
        insecure: cli.insecure,
        seed: cli.seed,
    };
    let config = NodeConfig::load(&path, explicit, overrides)?;

    let keypair = Keypair::generate(config.key_seed()).context("Failed to generate identity")?;
    let host = Host::start(config.host_config(), keypair)
        .await
        .context("Failed to start host")?;
    host.register_handler(ProtocolId::echo(), Arc::new(EchoHandler::default()))?;

    let result = match config.target.clone() {
        None => serve(&host).await,
        Some(target) => run_echo(&host, &target).await,
    };
    host.shutdown().await;
    result
}

/// Prints the node address and serves until Ctrl-C.
async fn serve(host: &Host) -> Result<()> {
    println!("Strand node listening");
    println!("  Node ID: {}", host.node_id());
    println!("  Address: {}", host.peer_address());
    if host.local_addr().ip().is_unspecified() {
        warn!("Listening on an unspecified address; peers must substitute a reachable IP");
    }

    signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");
    Ok(())
}

/// Sends one line to `target` and prints the reply.
async fn run_echo(host: &Host, target: &PeerAddress) -> Result<()> {
    host.add_peer(PeerRecord::permanent(target));
    let stream = host
        .open_stream(&target.node_id(), &ProtocolId::echo())
        .await
        .with_context(|| format!("Failed to open echo stream to {}", target))?;
    info!(peer = %target.node_id(), "Echo stream opened");

    let reply = echo::initiate(stream, MESSAGE)
        .await
        .context("Echo exchange failed")?;
    print!("{}", String::from_utf8_lossy(&reply));
    Ok(())
}
