//! Requests against services on the agent's network

use bytes::Bytes;
use http::{
    Request, Response,
    header::{CONTENT_LENGTH, HOST},
};
use reqwest::{Client, redirect::Policy};
use reverse_relay_common::{Result, TunnelError};
use std::time::Duration;
use tracing::debug;

/// Build the HTTP client used for local requests
///
/// Redirects are never followed: a 3xx goes back to the public caller as is.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .redirect(Policy::none())
        .timeout(timeout)
        .no_proxy()
        .build()
        .map_err(|e| TunnelError::LocalServiceUnavailable(e.to_string()))
}

/// Execute a decoded request and buffer the whole response
///
/// Redirect responses are returned with an empty body.
pub async fn fetch(client: &Client, request: Request<Bytes>) -> Result<Response<Bytes>> {
    let (parts, body) = request.into_parts();
    let url = parts.uri.to_string();

    let mut headers = parts.headers;
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);

    let response = client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| TunnelError::LocalServiceUnavailable(e.to_string()))?;

    let status = response.status();
    let version = response.version();
    let headers = response.headers().clone();

    let body = if status.is_redirection() {
        debug!("Redirect {} from {} not followed", status, url);
        Bytes::new()
    } else {
        response
            .bytes()
            .await
            .map_err(|e| TunnelError::LocalServiceUnavailable(e.to_string()))?
    };

    let mut local_response = Response::builder()
        .status(status)
        .version(version)
        .body(body)
        .map_err(|e| TunnelError::LocalServiceUnavailable(e.to_string()))?;
    *local_response.headers_mut() = headers;

    Ok(local_response)
}
