use thiserror::Error;

/// Error types for the reverse relay
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Failed to dial relay at {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid envelope format: {0}")]
    Format(String),

    #[error("No route configured for host: {0}")]
    RouteNotFound(String),

    #[error("Failed to encode HTTP message: {0}")]
    Encode(String),

    #[error("No tunnel connection available")]
    CapacityExhausted,

    #[error("Local service unavailable: {0}")]
    LocalServiceUnavailable(String),

    #[error("Unexpected status marker: {0:?}")]
    UnexpectedMarker([u8; 4]),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TunnelError {
    /// Errors that must stop the owning worker instead of triggering a redial
    pub fn is_fatal(&self) -> bool {
        matches!(self, TunnelError::Auth(_) | TunnelError::Config(_))
    }
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
