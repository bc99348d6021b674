/// Length of the shared-secret credential written by the agent (SHA-1 digest)
pub const CREDENTIAL_LEN: usize = 20;

/// Width of every status marker and of the envelope signature
pub const MARKER_LEN: usize = 4;

/// Read deadline for the credential on a freshly accepted tunnel connection (5 seconds)
pub const AUTH_TIMEOUT_SECS: u64 = 5;

/// TCP keepalive period applied to admitted tunnel connections (2 seconds)
pub const RELAY_KEEPALIVE_SECS: u64 = 2;

/// TCP keepalive idle time on agent-dialed tunnel connections (15 seconds)
pub const AGENT_KEEPALIVE_SECS: u64 = 15;

/// Capacity of the relay's idle connection queue
pub const POOL_CAPACITY: usize = 1000;

/// Fixed delay before an agent worker redials the relay (5 seconds)
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// Timeout for the agent's request against the local service (25 seconds)
pub const LOCAL_REQUEST_TIMEOUT_SECS: u64 = 25;

/// Upper bound on a single envelope payload (64 MB)
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Smallest request payload that can hold a scheme flag and a request line
/// (`GET / HTTP/1.0\r\n\r\n` is 18 bytes)
pub const MIN_REQUEST_PAYLOAD_BYTES: usize = 1 + 18;

/// Default number of agent workers
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;

/// Default tunnel listener address on the relay
pub const DEFAULT_TUNNEL_ADDR: &str = "0.0.0.0:8284";

/// Default public HTTP listener address on the relay
pub const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8024";
