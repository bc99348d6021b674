use bytes::Bytes;
use http::{Method, Response, StatusCode, Version, header::CONTENT_LENGTH};
use std::borrow::Cow;

use super::frame;
use crate::{
    error::{Result, TunnelError},
    routes::RouteTable,
    utils::{MAX_HEADERS, declared_body_len, parsed_to_headers, take_body, write_headers},
};

/// Statuses that never carry a body
fn is_bodyless(status: StatusCode) -> bool {
    status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

/// Serialize a response into a complete envelope ready for the wire
///
/// `method` is the method of the request being answered. With `rewrite_host`,
/// internal targets in header values and in the body are replaced by their
/// public domain before `Content-Length` is computed. A response to `HEAD`
/// has no body and keeps the `Content-Length` the local service declared.
pub fn encode_response(
    response: &Response<Bytes>,
    method: &Method,
    rewrite_host: bool,
    routes: &RouteTable,
) -> Result<Vec<u8>> {
    let status = response.status();
    let rewrite = rewrite_host.then_some(routes);
    let head = *method == Method::HEAD;

    let body: Cow<'_, [u8]> = match rewrite {
        _ if head || is_bodyless(status) => Cow::Borrowed(&[]),
        Some(routes) => routes.rewrite(response.body()),
        None => Cow::Borrowed(response.body().as_ref()),
    };

    let mut payload = Vec::with_capacity(256 + body.len());
    let version = if response.version() == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    };
    payload.extend_from_slice(
        format!(
            "{} {} {}\r\n",
            version,
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );

    write_headers(&mut payload, response.headers(), rewrite);
    if head && !is_bodyless(status) {
        if let Some(declared) = response.headers().get(CONTENT_LENGTH) {
            payload.extend_from_slice(b"content-length: ");
            payload.extend_from_slice(declared.as_bytes());
            payload.extend_from_slice(b"\r\n");
        }
    } else if !is_bodyless(status) {
        payload.extend_from_slice(format!("content-length: {}\r\n", body.len()).as_bytes());
    }
    payload.extend_from_slice(b"\r\n");
    payload.extend_from_slice(&body);

    frame(&payload)
}

/// Parse a response payload
///
/// `method` is the method of the request being answered: a response to `HEAD`
/// never has a body, whatever its `Content-Length` says.
pub fn decode_response(payload: &[u8], method: &Method) -> Result<Response<Bytes>> {
    let mut parsed_headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut parsed_headers);
    let header_len = match parsed.parse(payload) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => {
            return Err(TunnelError::Format("Incomplete HTTP response".to_string()));
        }
        Err(e) => return Err(TunnelError::Format(format!("Invalid HTTP response: {}", e))),
    };

    let status = StatusCode::from_u16(parsed.code.unwrap_or(0))
        .map_err(|e| TunnelError::Format(format!("Invalid status code: {}", e)))?;
    let version = if parsed.version == Some(0) {
        Version::HTTP_10
    } else {
        Version::HTTP_11
    };

    let headers = parsed_to_headers(&*parsed.headers)?;
    let body = if *method == Method::HEAD || is_bodyless(status) {
        Bytes::new()
    } else {
        take_body(&payload[header_len..], declared_body_len(&headers)?)?
    };

    let mut response = Response::builder()
        .status(status)
        .version(version)
        .body(body)
        .map_err(|e| TunnelError::Format(e.to_string()))?;
    *response.headers_mut() = headers;

    Ok(response)
}
