//! Private-side agent for the reverse relay
//!
//! The agent keeps a fixed number of outbound TCP connections open to the
//! relay. Each connection is owned by one [`Worker`] which authenticates,
//! waits for request envelopes, runs them against the local network and sends
//! the responses back. Workers redial on any connection failure and stop only
//! when the relay rejects the shared secret.

use reverse_relay_common::{
    AgentConfig, Result, RouteTable,
    constants::{LOCAL_REQUEST_TIMEOUT_SECS, RECONNECT_DELAY_SECS},
};
use std::{sync::Arc, time::Duration};

pub mod local;
pub mod pool;
pub mod worker;

pub use pool::AgentPool;
pub use worker::{ConnectionState, Worker};

/// Connect timeout when dialing the relay
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration shared by all workers
#[derive(Debug, Clone)]
pub struct Config {
    /// Relay tunnel listener (host:port)
    pub relay_addr: String,

    /// Shared secret used to derive the credential
    pub secret: String,

    /// Number of workers (one tunnel connection each)
    pub max_connections: usize,

    /// Rewrite internal targets to public domains in responses
    pub rewrite_host_in_responses: bool,

    /// Public domain to internal target mapping
    pub routes: Arc<RouteTable>,

    /// Fixed delay before redialing after a failure
    pub reconnect_delay: Duration,

    /// Timeout for a single dial attempt
    pub connect_timeout: Duration,

    /// Timeout for the request against the local service
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_agent_config(config: AgentConfig) -> Result<Self> {
        config.validate()?;
        let routes = config.route_table()?;

        Ok(Self {
            relay_addr: config.relay_addr,
            secret: config.secret,
            max_connections: config.max_connections,
            rewrite_host_in_responses: config.rewrite_host_in_responses,
            routes: Arc::new(routes),
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(LOCAL_REQUEST_TIMEOUT_SECS),
        })
    }
}
