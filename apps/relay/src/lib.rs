//! Public-side relay for the reverse tunnel
//!
//! The relay owns two listeners. Agents dial the tunnel listener, authenticate
//! with the hourly credential and wait in a [`RelayPool`]. Public HTTP requests
//! arrive on the HTTP listener and are forwarded over one pooled connection
//! each.

use reverse_relay_common::{
    Result, TunnelError,
    constants::{DEFAULT_HTTP_ADDR, DEFAULT_TUNNEL_ADDR, POOL_CAPACITY},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

pub mod error_handling;
pub mod handlers;
pub mod pool;


pub use pool::{RelayPool, TunnelConnection};

/// Relay settings
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address agents dial
    pub tunnel_addr: String,

    /// Address public HTTP clients connect to
    pub http_addr: String,

    /// Shared secret the agents derive their credential from
    pub secret: String,

    /// Maximum number of idle tunnel connections
    pub pool_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tunnel_addr: DEFAULT_TUNNEL_ADDR.to_string(),
            http_addr: DEFAULT_HTTP_ADDR.to_string(),
            secret: String::new(),
            pool_capacity: POOL_CAPACITY,
        }
    }
}

/// Bound relay, ready to run
pub struct Relay {
    tunnel: TcpListener,
    http: TcpListener,
    pool: Arc<RelayPool>,
    secret: Arc<str>,
}

impl Relay {
    pub async fn bind(config: &RelayConfig) -> Result<Self> {
        if config.secret.is_empty() {
            return Err(TunnelError::Config("secret must not be empty".to_string()));
        }
        if config.pool_capacity == 0 {
            return Err(TunnelError::Config(
                "pool capacity must be at least 1".to_string(),
            ));
        }

        let tunnel = TcpListener::bind(&config.tunnel_addr).await?;
        let http = TcpListener::bind(&config.http_addr).await?;

        Ok(Self {
            tunnel,
            http,
            pool: Arc::new(RelayPool::new(config.pool_capacity)),
            secret: Arc::from(config.secret.as_str()),
        })
    }

    pub fn tunnel_addr(&self) -> Result<SocketAddr> {
        Ok(self.tunnel.local_addr()?)
    }

    pub fn http_addr(&self) -> Result<SocketAddr> {
        Ok(self.http.local_addr()?)
    }

    pub fn pool(&self) -> Arc<RelayPool> {
        self.pool.clone()
    }

    /// Serve both listeners until one of them fails
    pub async fn run(self) -> Result<()> {
        info!(
            "Relay running: tunnel {}, http {}",
            self.tunnel_addr()?,
            self.http_addr()?
        );

        let Self {
            tunnel,
            http,
            pool,
            secret,
        } = self;

        tokio::select! {
            result = handlers::serve_tunnel(tunnel, pool.clone(), secret) => result,
            result = handlers::serve_public(http, pool) => result,
        }
    }
}
