//! YAML configuration for the agent
//!
//! ```yaml
//! relay-addr: relay.example.com:8284
//! secret: "88888888"
//! max-connections: 4
//! rewrite-host-in-responses: true
//! routes:
//!   - external-domain: a.example.com
//!     internal-target: 10.0.0.5:8080
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{
    constants::DEFAULT_MAX_CONNECTIONS,
    error::{Result, TunnelError},
    routes::{RouteTable, TunnelRoute},
};

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

/// Agent configuration as read from disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct AgentConfig {
    /// Relay tunnel listener (host:port)
    pub relay_addr: String,

    /// Shared secret, must match the relay's
    pub secret: String,

    /// Number of concurrent tunnel connections to keep open
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Replace internal targets with public domains in responses
    #[serde(default)]
    pub rewrite_host_in_responses: bool,

    #[serde(default)]
    pub routes: Vec<TunnelRoute>,
}

impl AgentConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: AgentConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            TunnelError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.relay_addr.trim().is_empty() {
            return Err(TunnelError::Config("relay-addr must not be empty".to_string()));
        }
        if self.secret.is_empty() {
            return Err(TunnelError::Config("secret must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(TunnelError::Config(
                "max-connections must be at least 1".to_string(),
            ));
        }
        // Surfaces duplicate domains at load time
        self.route_table().map(|_| ())
    }

    pub fn route_table(&self) -> Result<RouteTable> {
        RouteTable::new(self.routes.clone())
    }
}
