//! One tunnel connection and its serve loop
//!
//! ```text
//! Disconnected -> Dialing -> Authenticating -> Ready <-> Serving
//!       ^            |                           |
//!       +------------+---- I/O error (delay) ----+
//! ```
//!
//! A rejected credential ends the worker; everything else leads back to
//! `Dialing` after a fixed delay.

use reqwest::Client;
use reverse_relay_common::{
    Marker, Result, TunnelError, constants::AGENT_KEEPALIVE_SECS, current_credential,
    decode_request, encode_response, read_marker, read_payload, write_marker,
};
use socket2::{SockRef, TcpKeepalive};
use std::{sync::Arc, time::Duration};
use tokio::{io::AsyncWriteExt, net::TcpStream};
use tracing::{debug, error, info, warn};

use crate::{Config, local};

/// Lifecycle of a worker's tunnel connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Dialing,
    Authenticating,
    Ready,
    Serving,
}

/// Owns one outbound tunnel connection for its whole lifetime
pub struct Worker {
    id: usize,
    config: Arc<Config>,
    client: Client,
    state: ConnectionState,
}

impl Worker {
    pub fn new(id: usize, config: Arc<Config>, client: Client) -> Self {
        Self {
            id,
            config,
            client,
            state: ConnectionState::Disconnected,
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, state: ConnectionState) {
        debug!("Worker {}: {:?} -> {:?}", self.id, self.state, state);
        self.state = state;
    }

    /// Dial, authenticate and serve until the secret is rejected
    ///
    /// Only returns on a fatal error; transient failures are retried forever.
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.set_state(ConnectionState::Dialing);

            match self.dial().await {
                Ok(stream) => match self.serve(stream).await {
                    Err(e) if e.is_fatal() => {
                        error!("Worker {} halted: {}", self.id, e);
                        self.set_state(ConnectionState::Disconnected);
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(
                            "Worker {}: relay connection lost ({}), reconnecting in {:?}",
                            self.id, e, self.config.reconnect_delay
                        );
                    }
                    Ok(()) => {
                        info!("Worker {}: relay closed the connection", self.id);
                    }
                },
                Err(e) => {
                    warn!(
                        "Worker {}: {}, retrying in {:?}",
                        self.id, e, self.config.reconnect_delay
                    );
                }
            }

            self.set_state(ConnectionState::Disconnected);
            tokio::time::sleep(self.config.reconnect_delay).await;
        }
    }

    async fn dial(&self) -> Result<TcpStream> {
        let addr = &self.config.relay_addr;
        debug!("Worker {}: dialing {}", self.id, addr);

        let stream = tokio::time::timeout(self.config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TunnelError::Dial {
                addr: addr.clone(),
                source: std::io::ErrorKind::TimedOut.into(),
            })?
            .map_err(|source| TunnelError::Dial {
                addr: addr.clone(),
                source,
            })?;

        let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(AGENT_KEEPALIVE_SECS));
        if let Err(e) = SockRef::from(&stream).set_tcp_keepalive(&keepalive) {
            warn!("Worker {}: failed to enable keepalive: {}", self.id, e);
        }

        Ok(stream)
    }

    async fn serve(&mut self, mut stream: TcpStream) -> Result<()> {
        self.set_state(ConnectionState::Authenticating);
        stream
            .write_all(&current_credential(&self.config.secret))
            .await?;
        stream.flush().await?;
        self.set_state(ConnectionState::Ready);

        loop {
            match read_marker(&mut stream).await? {
                Marker::VerifyFailed => {
                    return Err(TunnelError::Auth(
                        "relay rejected the shared secret".to_string(),
                    ));
                }
                Marker::VerifySucceeded => {
                    info!("Worker {}: authenticated with {}", self.id, self.config.relay_addr);
                }
                Marker::ServerError => {
                    warn!("Worker {}: relay reported an error", self.id);
                }
                Marker::Sign => {
                    self.set_state(ConnectionState::Serving);
                    self.serve_request(&mut stream).await?;
                    self.set_state(ConnectionState::Ready);
                }
            }
        }
    }

    /// Handle one envelope; errors returned from here tear the connection down
    async fn serve_request(&self, stream: &mut TcpStream) -> Result<()> {
        let payload = match read_payload(stream).await {
            Ok(payload) => payload,
            Err(e) => {
                let _ = write_marker(stream, Marker::ServerError).await;
                return Err(e);
            }
        };
        debug!("Worker {}: received {} byte request", self.id, payload.len());

        let envelope = match self.handle(&payload).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Worker {}: request failed: {}", self.id, e);
                return write_marker(stream, Marker::ServerError).await;
            }
        };

        stream.write_all(&envelope).await?;
        stream.flush().await?;
        debug!("Worker {}: request completed, {} bytes sent", self.id, envelope.len());
        Ok(())
    }

    async fn handle(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let request = decode_request(payload, &self.config.routes)?;
        info!("Worker {}: {} {}", self.id, request.method(), request.uri());

        let method = request.method().clone();
        let response = local::fetch(&self.client, request).await?;
        encode_response(
            &response,
            &method,
            self.config.rewrite_host_in_responses,
            &self.config.routes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{Method, Request, StatusCode};
    use reverse_relay_common::{
        RouteTable, Scheme, TunnelRoute, decode_response, encode_request, verify,
    };
    use tokio::{
        io::AsyncReadExt,
        net::TcpListener,
        task::JoinHandle,
        time::timeout,
    };

    const SECRET: &str = "test-secret";

    /// Local service answering every connection with the same response
    async fn spawn_backend(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => buf.extend_from_slice(&chunk[..n]),
                        }
                    }
                    let _ = socket.write_all(response.as_bytes()).await;
                });
            }
        });
        addr
    }

    fn test_config(relay_addr: String, routes: Vec<TunnelRoute>) -> Arc<Config> {
        Arc::new(Config {
            relay_addr,
            secret: SECRET.to_string(),
            max_connections: 1,
            rewrite_host_in_responses: true,
            routes: Arc::new(RouteTable::new(routes).unwrap()),
            reconnect_delay: Duration::from_millis(50),
            connect_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
        })
    }

    fn spawn_worker(config: Arc<Config>) -> JoinHandle<Result<()>> {
        let client = local::build_client(config.request_timeout).unwrap();
        tokio::spawn(Worker::new(0, config, client).run())
    }

    async fn accept_authenticated(listener: &TcpListener) -> TcpStream {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut credential = [0u8; 20];
        stream.read_exact(&mut credential).await.unwrap();
        assert!(verify(&credential, SECRET));
        write_marker(&mut stream, Marker::VerifySucceeded).await.unwrap();
        stream
    }

    fn get(host: &str, path: &str) -> Vec<u8> {
        let request = Request::builder()
            .uri(path)
            .header("host", host)
            .body(Bytes::new())
            .unwrap();
        encode_request(&request, Scheme::Http).unwrap()
    }

    #[tokio::test]
    async fn test_worker_serves_request() {
        let backend = spawn_backend(
            "HTTP/1.1 200 OK\r\ncontent-length: 18\r\n\r\nserved by BACKEND!",
        )
        .await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = listener.local_addr().unwrap().to_string();
        let worker = spawn_worker(test_config(
            relay_addr,
            vec![TunnelRoute::new("app.example.com", backend)],
        ));

        let mut stream = accept_authenticated(&listener).await;
        stream.write_all(&get("app.example.com", "/status")).await.unwrap();

        let marker = timeout(Duration::from_secs(5), read_marker(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marker, Marker::Sign);
        let payload = read_payload(&mut stream).await.unwrap();
        let response = decode_response(&payload, &Method::GET).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from_static(b"served by BACKEND!"));

        worker.abort();
    }

    #[tokio::test]
    async fn test_unknown_route_keeps_connection() {
        let backend = spawn_backend("HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nok").await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = listener.local_addr().unwrap().to_string();
        let worker = spawn_worker(test_config(
            relay_addr,
            vec![TunnelRoute::new("app.example.com", backend)],
        ));

        let mut stream = accept_authenticated(&listener).await;

        stream.write_all(&get("other.example.com", "/")).await.unwrap();
        let marker = timeout(Duration::from_secs(5), read_marker(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marker, Marker::ServerError);

        // Same connection still serves the next request
        stream.write_all(&get("app.example.com", "/")).await.unwrap();
        let marker = timeout(Duration::from_secs(5), read_marker(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marker, Marker::Sign);
        let payload = read_payload(&mut stream).await.unwrap();
        let response = decode_response(&payload, &Method::GET).unwrap();
        assert_eq!(response.body(), &Bytes::from_static(b"ok"));

        worker.abort();
    }

    #[tokio::test]
    async fn test_redirect_forwarded_without_body() {
        let backend = spawn_backend(
            "HTTP/1.1 301 Moved Permanently\r\nlocation: /new\r\ncontent-length: 4\r\n\r\nmove",
        )
        .await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = listener.local_addr().unwrap().to_string();
        let worker = spawn_worker(test_config(
            relay_addr,
            vec![TunnelRoute::new("app.example.com", backend)],
        ));

        let mut stream = accept_authenticated(&listener).await;
        stream.write_all(&get("app.example.com", "/old")).await.unwrap();

        assert_eq!(read_marker(&mut stream).await.unwrap(), Marker::Sign);
        let payload = read_payload(&mut stream).await.unwrap();
        let response = decode_response(&payload, &Method::GET).unwrap();
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()["location"], "/new");
        assert_eq!(response.headers()["content-length"], "0");
        assert!(response.body().is_empty());

        worker.abort();
    }

    #[tokio::test]
    async fn test_worker_redials_after_disconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = listener.local_addr().unwrap().to_string();
        let worker = spawn_worker(test_config(relay_addr, vec![]));

        let first = accept_authenticated(&listener).await;
        drop(first);

        let second = timeout(Duration::from_secs(5), accept_authenticated(&listener)).await;
        assert!(second.is_ok());
        assert!(!worker.is_finished());

        worker.abort();
    }

    #[tokio::test]
    async fn test_worker_keeps_dialing_until_relay_listens() {
        // Reserve a port, then free it so the first dials are refused
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let worker = spawn_worker(test_config(addr.to_string(), vec![]));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!worker.is_finished());

        let listener = TcpListener::bind(addr).await.unwrap();
        let stream = timeout(Duration::from_secs(5), accept_authenticated(&listener)).await;
        assert!(stream.is_ok());

        worker.abort();
    }

    #[tokio::test]
    async fn test_truncated_request_reports_error_and_redials() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = listener.local_addr().unwrap().to_string();
        let worker = spawn_worker(test_config(relay_addr, vec![]));

        let mut stream = accept_authenticated(&listener).await;

        // Declare 100 bytes, send 10, then close our write half
        stream.write_all(b"sign").await.unwrap();
        stream.write_all(&100u32.to_le_bytes()).await.unwrap();
        stream.write_all(b"GET / HTTP").await.unwrap();
        stream.shutdown().await.unwrap();

        let marker = timeout(Duration::from_secs(5), read_marker(&mut stream))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(marker, Marker::ServerError);

        // The connection is abandoned and a fresh one is dialed
        let mut buf = [0u8; 1];
        let closed = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed, 0);

        let second = timeout(Duration::from_secs(5), accept_authenticated(&listener)).await;
        assert!(second.is_ok());
        assert!(!worker.is_finished());

        worker.abort();
    }

    #[tokio::test]
    async fn test_worker_halts_on_rejected_secret() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = listener.local_addr().unwrap().to_string();
        let worker = spawn_worker(test_config(relay_addr, vec![]));

        let (mut stream, _) = listener.accept().await.unwrap();
        let mut credential = [0u8; 20];
        stream.read_exact(&mut credential).await.unwrap();
        write_marker(&mut stream, Marker::VerifyFailed).await.unwrap();
        drop(stream);

        let result = timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
        assert!(matches!(result, Err(TunnelError::Auth(_))));
    }

    #[tokio::test]
    async fn test_new_worker_is_disconnected() {
        let config = test_config("127.0.0.1:1".to_string(), vec![]);
        let client = local::build_client(config.request_timeout).unwrap();
        let worker = Worker::new(7, config, client);
        assert_eq!(worker.state(), ConnectionState::Disconnected);
    }
}
