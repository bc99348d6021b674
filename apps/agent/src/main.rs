use anyhow::{Context, Result};
use clap::Parser;
use reverse_relay_agent::{AgentPool, Config};
use reverse_relay_common::AgentConfig;
use std::{path::PathBuf, time::Duration};
use tracing::{error, info};

/// CLI arguments for the agent
#[derive(Parser, Debug)]
#[command(name = "rra")]
#[command(about = "Reverse relay agent: exposes local HTTP services through a public relay", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "RRA_CONFIG", default_value = "conf.yml")]
    config: PathBuf,

    /// Override the relay tunnel address from the config file
    #[arg(long, env = "RRA_RELAY_ADDR")]
    relay_addr: Option<String>,

    /// Override the shared secret from the config file
    #[arg(long, env = "RRA_SECRET")]
    secret: Option<String>,

    /// Override the number of tunnel connections
    #[arg(long)]
    max_connections: Option<usize>,

    /// Seconds to wait before redialing the relay
    #[arg(long, default_value = "5")]
    reconnect_delay: u64,

    /// Local request timeout in seconds
    #[arg(long, default_value = "25")]
    request_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args, mut file: AgentConfig) -> reverse_relay_common::Result<Config> {
    if let Some(relay_addr) = &args.relay_addr {
        file.relay_addr = relay_addr.clone();
    }
    if let Some(secret) = &args.secret {
        file.secret = secret.clone();
    }
    if let Some(max_connections) = args.max_connections {
        file.max_connections = max_connections;
    }

    let mut config = Config::from_agent_config(file)?;
    config.reconnect_delay = Duration::from_secs(args.reconnect_delay);
    config.request_timeout = Duration::from_secs(args.request_timeout);
    Ok(config)
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

    info!("Reverse relay agent v{}", env!("CARGO_PKG_VERSION"));

    let file = AgentConfig::load(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    let config = build_config(&args, file)?;

    info!("Relay: {}", config.relay_addr);
    info!("Routes: {}", config.routes.len());
    for route in config.routes.routes() {
        info!("  {} -> {}", route.external_domain, route.internal_target);
    }

    let pool = AgentPool::new(config);

    tokio::select! {
        result = pool.run() => {
            if let Err(e) = result {
                error!("Agent stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl-C, shutting down...");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> AgentConfig {
        AgentConfig::from_yaml("relay-addr: relay:8284\nsecret: from-file\nmax-connections: 2\n")
            .unwrap()
    }

    #[test]
    fn test_build_config_from_file() {
        let args = Args::parse_from(["rra"]);
        let config = build_config(&args, file()).unwrap();

        assert_eq!(config.relay_addr, "relay:8284");
        assert_eq!(config.secret, "from-file");
        assert_eq!(config.max_connections, 2);
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(25));
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "rra",
            "--relay-addr",
            "other:9000",
            "--secret",
            "from-cli",
            "--max-connections",
            "8",
            "--reconnect-delay",
            "1",
        ]);
        let config = build_config(&args, file()).unwrap();

        assert_eq!(config.relay_addr, "other:9000");
        assert_eq!(config.secret, "from-cli");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.reconnect_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let args = Args::parse_from(["rra", "--max-connections", "0"]);
        assert!(build_config(&args, file()).is_err());
    }
}
