use bytes::Bytes;
use http::{
    HeaderValue, Method, Request, Uri, Version,
    header::{CONTENT_LENGTH, HOST},
};

use super::frame;
use crate::{
    constants::MIN_REQUEST_PAYLOAD_BYTES,
    error::{Result, TunnelError},
    routes::RouteTable,
    utils::{MAX_HEADERS, declared_body_len, parsed_to_headers, strip_port, take_body, write_headers},
};

/// Scheme the public caller used, carried as the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    #[default]
    Http,
    Https,
}

impl Scheme {
    pub fn flag(self) -> u8 {
        match self {
            Scheme::Http => 0,
            Scheme::Https => 1,
        }
    }

    pub fn from_flag(flag: u8) -> Self {
        if flag == 1 { Scheme::Https } else { Scheme::Http }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

fn version_str(version: Version) -> &'static str {
    if version == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

/// Serialize a request into a complete envelope ready for the wire
pub fn encode_request(request: &Request<Bytes>, scheme: Scheme) -> Result<Vec<u8>> {
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| !pq.is_empty())
        .unwrap_or("/");

    let body = request.body();
    let mut payload = Vec::with_capacity(256 + body.len());
    payload.push(scheme.flag());
    payload.extend_from_slice(request.method().as_str().as_bytes());
    payload.push(b' ');
    payload.extend_from_slice(target.as_bytes());
    payload.push(b' ');
    payload.extend_from_slice(version_str(request.version()).as_bytes());
    payload.extend_from_slice(b"\r\n");

    if !request.headers().contains_key(HOST) {
        let authority = request.uri().authority().ok_or_else(|| {
            TunnelError::Encode("Request has neither a Host header nor an authority".to_string())
        })?;
        payload.extend_from_slice(b"host: ");
        payload.extend_from_slice(authority.as_str().as_bytes());
        payload.extend_from_slice(b"\r\n");
    }

    write_headers(&mut payload, request.headers(), None);

    let needs_length = !body.is_empty()
        || request.headers().contains_key(CONTENT_LENGTH)
        || matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH);
    if needs_length {
        payload.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    }

    payload.extend_from_slice(b"\r\n");
    payload.extend_from_slice(body);

    frame(&payload)
}

/// Parse a request payload and point it at the route's internal target
///
/// The returned request carries an absolute URI (`scheme://target/path`) and a
/// `Host` header naming the internal target.
pub fn decode_request(payload: &[u8], routes: &RouteTable) -> Result<Request<Bytes>> {
    if payload.len() < MIN_REQUEST_PAYLOAD_BYTES {
        return Err(TunnelError::Format(format!(
            "Request payload too small: {} bytes",
            payload.len()
        )));
    }

    let scheme = Scheme::from_flag(payload[0]);
    let data = &payload[1..];

    let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut parsed_headers);
    let header_len = match parsed.parse(data) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            return Err(TunnelError::Format("Incomplete HTTP request".to_string()));
        }
        Err(e) => return Err(TunnelError::Format(format!("Invalid HTTP request: {}", e))),
    };

    let method = Method::from_bytes(parsed.method.unwrap_or("GET").as_bytes())
        .map_err(|e| TunnelError::Format(format!("Invalid method: {}", e)))?;
    let path = parsed.path.unwrap_or("/");
    let version = if parsed.version == Some(0) {
        Version::HTTP_10
    } else {
        Version::HTTP_11
    };

    let mut headers = parsed_to_headers(&*parsed.headers)?;
    let body = take_body(&data[header_len..], declared_body_len(&headers)?)?;

    // Absolute-form targets carry their own authority
    let target: Uri = path
        .parse()
        .map_err(|e| TunnelError::Format(format!("Invalid request target {}: {}", path, e)))?;
    let host = match headers.get(HOST).and_then(|h| h.to_str().ok()) {
        Some(host) => host.to_string(),
        None => target
            .authority()
            .map(|a| a.to_string())
            .ok_or_else(|| TunnelError::Format("Request has no Host".to_string()))?,
    };

    let internal = match routes.resolve_internal(strip_port(&host)) {
        Some(internal) => internal.to_string(),
        // Already addressed to a configured target
        None if routes.resolve_external(&host).is_some() => host.clone(),
        None => return Err(TunnelError::RouteNotFound(host)),
    };

    let path_and_query = target
        .path_and_query()
        .map(|pq| pq.as_str())
        .filter(|pq| pq.starts_with('/'))
        .unwrap_or("/");
    let uri: Uri = format!("{}://{}{}", scheme.as_str(), internal, path_and_query)
        .parse()
        .map_err(|e| TunnelError::Format(format!("Invalid target {}: {}", internal, e)))?;

    headers.insert(
        HOST,
        HeaderValue::from_str(&internal)
            .map_err(|e| TunnelError::Format(format!("Invalid host {}: {}", internal, e)))?,
    );

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .version(version)
        .body(body)
        .map_err(|e| TunnelError::Format(e.to_string()))?;
    *request.headers_mut() = headers;

    Ok(request)
}
