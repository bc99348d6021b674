//! Public HTTP listener and the request dispatcher
//!
//! Each public request borrows one idle tunnel connection for a single
//! request/response cycle. A connection that fails while writing the request or
//! reading the reply is dropped and the request is retried on the next idle
//! connection, until the pool runs dry.

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, server::conn::http1, service::service_fn};
use hyper_util::rt::TokioIo;
use reverse_relay_common::{
    Marker, Result, Scheme, TunnelError, decode_response, encode_request, read_marker,
    read_payload,
};
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpListener};
use tracing::{debug, info, warn};

use crate::{
    error_handling::{bad_request, error_response},
    pool::{RelayPool, TunnelConnection},
};

const ACCEPT_BACKOFF_MS: u64 = 100;

/// What came back over a tunnel connection
enum Reply {
    /// Response envelope payload
    Payload(Bytes),
    /// The agent answered with the server-error marker
    Rejected,
}

/// Serve public HTTP/1.1 connections forever
pub async fn serve_public(listener: TcpListener, pool: Arc<RelayPool>) -> Result<()> {
    info!("Public HTTP listener on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept public connection: {}", e);
                tokio::time::sleep(Duration::from_millis(ACCEPT_BACKOFF_MS)).await;
                continue;
            }
        };

        let pool = pool.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let pool = pool.clone();
                async move { Ok::<_, Infallible>(handle_forwarding(&pool, req).await) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!("Public connection {} ended: {}", peer, e);
            }
        });
    }
}

/// Handle one public request
pub async fn handle_forwarding(
    pool: &RelayPool,
    request: Request<Incoming>,
) -> Response<Full<Bytes>> {
    let scheme = detect_scheme(&request);
    let (parts, body) = request.into_parts();
    info!("{} {}", parts.method, parts.uri);

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read public request body: {}", e);
            return bad_request("Bad Request");
        }
    };

    match dispatch(pool, &Request::from_parts(parts, body), scheme).await {
        Ok(response) => response.map(Full::new),
        Err(e) => error_response(&e),
    }
}

/// `https` when the caller reached us through TLS, as far as we can tell
pub fn detect_scheme<B>(request: &Request<B>) -> Scheme {
    let forwarded_https = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("https"));

    if forwarded_https || request.uri().scheme() == Some(&http::uri::Scheme::HTTPS) {
        Scheme::Https
    } else {
        Scheme::Http
    }
}

/// Run a request through the tunnel
///
/// Fails with `CapacityExhausted` once no idle connection is left.
pub async fn dispatch(
    pool: &RelayPool,
    request: &Request<Bytes>,
    scheme: Scheme,
) -> Result<Response<Bytes>> {
    let envelope = encode_request(request, scheme)?;

    loop {
        let Some(mut conn) = pool.checkout().await else {
            return Err(TunnelError::CapacityExhausted);
        };

        match round_trip(&mut conn, &envelope).await {
            Ok(Reply::Payload(payload)) => {
                let decoded = decode_response(&payload, request.method());
                pool.release(conn).await;
                return decoded;
            }
            Ok(Reply::Rejected) => {
                pool.release(conn).await;
                return Err(TunnelError::LocalServiceUnavailable(
                    "agent rejected the request".to_string(),
                ));
            }
            Err(e) => {
                warn!(
                    "Connection {} to {} failed: {}, trying another",
                    conn.id(),
                    conn.peer(),
                    e
                );
            }
        }
    }
}

async fn round_trip(conn: &mut TunnelConnection, envelope: &[u8]) -> Result<Reply> {
    let stream = conn.stream_mut();
    stream.write_all(envelope).await?;
    stream.flush().await?;

    match read_marker(stream).await? {
        Marker::Sign => Ok(Reply::Payload(read_payload(stream).await?)),
        Marker::ServerError => Ok(Reply::Rejected),
        other => Err(TunnelError::UnexpectedMarker(*other.as_bytes())),
    }
}
