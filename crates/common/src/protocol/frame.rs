use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::Marker;
use crate::{
    constants::{MARKER_LEN, MAX_PAYLOAD_BYTES},
    error::{Result, TunnelError},
};

/// Wrap a payload as `sign | u32 LE length | payload`
pub fn frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > MAX_PAYLOAD_BYTES {
        return Err(TunnelError::Encode(format!(
            "Payload of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_PAYLOAD_BYTES
        )));
    }

    let mut buf = Vec::with_capacity(MARKER_LEN + 4 + payload.len());
    buf.extend_from_slice(Marker::Sign.as_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Read one 4-byte status marker
pub async fn read_marker<R>(reader: &mut R) -> Result<Marker>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MARKER_LEN];
    reader.read_exact(&mut buf).await?;
    Marker::from_bytes(buf).ok_or(TunnelError::UnexpectedMarker(buf))
}

/// Write one status marker and flush it
pub async fn write_marker<W>(writer: &mut W, marker: Marker) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(marker.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the length prefix and the payload that follows a `sign` marker
///
/// Partial reads are accumulated until the declared length is reached; a
/// stream that ends first yields an `UnexpectedEof` I/O error.
pub async fn read_payload<R>(reader: &mut R) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32_le().await? as usize;
    if len == 0 {
        return Err(TunnelError::Format("Envelope declares an empty payload".to_string()));
    }
    if len > MAX_PAYLOAD_BYTES {
        return Err(TunnelError::Format(format!(
            "Envelope declares {} bytes, limit is {}",
            len, MAX_PAYLOAD_BYTES
        )));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}
