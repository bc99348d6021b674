//! Handler modules
//!
//! The relay listens on two ports: the tunnel port where agents connect and
//! authenticate, and the public port where HTTP requests arrive and are
//! dispatched over pooled tunnel connections.

pub mod connect;
pub mod forwarding;

pub use connect::{handle_connect, serve_tunnel};
pub use forwarding::{detect_scheme, dispatch, handle_forwarding, serve_public};
