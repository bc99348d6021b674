use bytes::Bytes;
use http::{
    HeaderMap, HeaderName, HeaderValue,
    header::{CONTENT_LENGTH, TRANSFER_ENCODING},
};

use crate::{
    error::{Result, TunnelError},
    routes::RouteTable,
};

/// Maximum number of headers accepted in a tunneled message
pub const MAX_HEADERS: usize = 100;

/// Headers that describe message framing; they are recomputed, never copied
pub fn is_framing_header(name: &HeaderName) -> bool {
    name == CONTENT_LENGTH || name == TRANSFER_ENCODING
}

/// Append `name: value\r\n` lines for every non-framing header
///
/// With a route table, internal targets in header values are replaced by
/// their public domain.
pub fn write_headers(buf: &mut Vec<u8>, headers: &HeaderMap, rewrite: Option<&RouteTable>) {
    for (name, value) in headers.iter() {
        if is_framing_header(name) {
            continue;
        }

        buf.extend_from_slice(name.as_str().as_bytes());
        buf.extend_from_slice(b": ");
        match rewrite {
            Some(routes) => buf.extend_from_slice(&routes.rewrite(value.as_bytes())),
            None => buf.extend_from_slice(value.as_bytes()),
        }
        buf.extend_from_slice(b"\r\n");
    }
}

/// Convert parsed header slices into an owned `HeaderMap`
pub fn parsed_to_headers(parsed: &[httparse::Header<'_>]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(parsed.len());

    for header in parsed {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|e| TunnelError::Format(format!("Invalid header name {}: {}", header.name, e)))?;
        let value = HeaderValue::from_bytes(header.value)
            .map_err(|e| TunnelError::Format(format!("Invalid value for {}: {}", header.name, e)))?;
        headers.append(name, value);
    }

    Ok(headers)
}

/// Body length declared by `Content-Length`, if any
///
/// Chunked bodies are rejected: tunneled messages are always fully buffered
/// and carry an explicit length.
pub fn declared_body_len(headers: &HeaderMap) -> Result<Option<usize>> {
    if headers.contains_key(TRANSFER_ENCODING) {
        return Err(TunnelError::Format(
            "Transfer-Encoding is not allowed inside an envelope".to_string(),
        ));
    }

    match headers.get(CONTENT_LENGTH) {
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or_else(|| TunnelError::Format(format!("Invalid Content-Length: {:?}", value))),
        None => Ok(None),
    }
}

/// Slice the body out of the bytes following the header block
pub fn take_body(rest: &[u8], declared: Option<usize>) -> Result<Bytes> {
    match declared {
        Some(len) if rest.len() < len => Err(TunnelError::Format(format!(
            "Body truncated: declared {} bytes, got {}",
            len,
            rest.len()
        ))),
        Some(len) => Ok(Bytes::copy_from_slice(&rest[..len])),
        None => Ok(Bytes::copy_from_slice(rest)),
    }
}

/// Strip an optional `:port` suffix from a Host value (IPv6 literals keep their brackets)
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }

    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
