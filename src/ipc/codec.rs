//! Frame codec shared by framed channels and the TCP front-end.
//!
//! Frame format:
//! ```text
//! ┌──────────┬──────────┬────────────────────────┐
//! │ len (4B) │ type(1B) │   payload              │
//! │ u32 BE   │ u8       │                        │
//! └──────────┴──────────┴────────────────────────┘
//! ```
//! Length = sizeof(type byte) + sizeof(payload), NOT including the 4-byte prefix.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Session handshake from a connecting client: `{"client_id": "..."}`.
pub const MSG_HELLO: u8 = 0x10;
/// Opaque channel message (framed channels).
pub const MSG_DATA: u8 = 0x20;
/// Request from client.
pub const MSG_REQUEST: u8 = 0x01;
/// Response to client.
pub const MSG_RESPONSE: u8 = 0x02;
/// Error response to client.
pub const MSG_ERROR: u8 = 0xFF;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }
}

/// Read one frame from the stream.
///
/// Returns `None` on clean EOF at a frame boundary. EOF inside a frame is an
/// `UnexpectedEof` error. `max_frame_bytes` caps the accepted frame length.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> std::io::Result<Option<Frame>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let frame_len = u32::from_be_bytes(len_buf);
    if frame_len > max_frame_bytes {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Frame too large: {} bytes (max {})", frame_len, max_frame_bytes),
        ));
    }
    if frame_len < 1 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Frame too short: missing type byte",
        ));
    }

    let mut kind = [0u8; 1];
    reader.read_exact(&mut kind).await?;
    let mut payload = vec![0u8; frame_len as usize - 1];
    reader.read_exact(&mut payload).await?;

    Ok(Some(Frame {
        kind: kind[0],
        payload,
    }))
}

/// Write one frame to the stream and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    kind: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    let frame_len = u32::try_from(payload.len() + 1).map_err(|_| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "payload exceeds u32 frame length")
    })?;
    writer.write_all(&frame_len.to_be_bytes()).await?;
    writer.write_all(&[kind]).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
