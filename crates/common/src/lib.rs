//! Common protocol and utilities for the reverse relay
//!
//! This crate provides the tunnel wire format, the shared-secret credential,
//! the route table and configuration used by both the agent (private side)
//! and the relay server (public side).

pub mod auth;
pub mod config;
pub mod constants;
pub mod error;
pub mod protocol;
pub mod routes;
pub mod utils;

// Re-export commonly used types for convenience
pub use auth::{Credential, compute_credential, current_credential, verify};
pub use config::AgentConfig;
pub use error::{Result, TunnelError};
pub use protocol::{
    Marker, Scheme, decode_request, decode_response, encode_request, encode_response,
    read_marker, read_payload, write_marker,
};
pub use routes::{RouteTable, TunnelRoute};
