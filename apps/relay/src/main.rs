use anyhow::{Context, Result};
use clap::Parser;
use reverse_relay_common::constants::{DEFAULT_HTTP_ADDR, DEFAULT_TUNNEL_ADDR, POOL_CAPACITY};
use reverse_relay_server::{Relay, RelayConfig};
use tracing::{error, info};

/// CLI arguments for the relay
#[derive(Parser, Debug)]
#[command(name = "rrs")]
#[command(about = "Reverse relay server: publishes private HTTP services through agent tunnels", long_about = None)]
#[command(version)]
struct Args {
    /// Shared secret agents authenticate with
    #[arg(short, long, env = "RRS_SECRET")]
    secret: String,

    /// Address agents connect to
    #[arg(long, env = "RRS_TUNNEL_ADDR", default_value = DEFAULT_TUNNEL_ADDR)]
    tunnel_addr: String,

    /// Address serving public HTTP traffic
    #[arg(long, env = "RRS_HTTP_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    http_addr: String,

    /// Maximum number of idle agent connections
    #[arg(long, default_value_t = POOL_CAPACITY)]
    pool_capacity: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl From<&Args> for RelayConfig {
    fn from(args: &Args) -> Self {
        Self {
            tunnel_addr: args.tunnel_addr.clone(),
            http_addr: args.http_addr.clone(),
            secret: args.secret.clone(),
            pool_capacity: args.pool_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    info!("Reverse relay server v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from(&args);
    let relay = Relay::bind(&config)
        .await
        .with_context(|| format!("Failed to bind {} / {}", config.tunnel_addr, config.http_addr))?;

    tokio::select! {
        result = relay.run() => {
            if let Err(e) = result {
                error!("Relay stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down...");
        }
    }

    Ok(())
}
