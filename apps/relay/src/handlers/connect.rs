//! Tunnel listener: admits agent connections into the pool
//!
//! Every inbound connection must present its 20-byte credential within
//! [`AUTH_TIMEOUT_SECS`]. Accepted connections get TCP keepalive, the
//! verification-succeeded marker, and a place in the pool.

use reverse_relay_common::{
    Marker, Result, TunnelError,
    constants::{AUTH_TIMEOUT_SECS, CREDENTIAL_LEN, RELAY_KEEPALIVE_SECS},
    verify, write_marker,
};
use socket2::{SockRef, TcpKeepalive};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::AsyncReadExt,
    net::{TcpListener, TcpStream},
};
use tracing::{info, warn};

use crate::pool::{RelayPool, TunnelConnection};

/// Pause after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF_MS: u64 = 100;

/// Accept agent connections forever
pub async fn serve_tunnel(
    listener: TcpListener,
    pool: Arc<RelayPool>,
    secret: Arc<str>,
) -> Result<()> {
    info!("Tunnel listener on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept tunnel connection: {}", e);
                tokio::time::sleep(Duration::from_millis(ACCEPT_BACKOFF_MS)).await;
                continue;
            }
        };

        let pool = pool.clone();
        let secret = secret.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connect(stream, peer, &pool, &secret).await {
                warn!("Agent {} not admitted: {}", peer, e);
            }
        });
    }
}

/// Authenticate one agent connection and hand it to the pool
pub async fn handle_connect(
    mut stream: TcpStream,
    peer: SocketAddr,
    pool: &RelayPool,
    secret: &str,
) -> Result<()> {
    let mut credential = [0u8; CREDENTIAL_LEN];
    tokio::time::timeout(
        Duration::from_secs(AUTH_TIMEOUT_SECS),
        stream.read_exact(&mut credential),
    )
    .await
    .map_err(|_| {
        TunnelError::Auth(format!(
            "no credential within {}s",
            AUTH_TIMEOUT_SECS
        ))
    })??;

    if !verify(&credential, secret) {
        let _ = write_marker(&mut stream, Marker::VerifyFailed).await;
        return Err(TunnelError::Auth("invalid credential".to_string()));
    }

    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(RELAY_KEEPALIVE_SECS));
    if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
        warn!("Failed to enable keepalive for {}: {}", peer, e);
    }

    write_marker(&mut stream, Marker::VerifySucceeded).await?;

    let conn = TunnelConnection::new(pool.next_id(), peer, stream);
    info!("Agent connected: {} (connection {})", peer, conn.id());
    pool.accept(conn).await
}
