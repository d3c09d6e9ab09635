//! Length-prefixed framing over any async byte stream.
//!
//! A frame is a 4-byte big-endian payload length followed by exactly that
//! many bytes of UTF-8 JSON. Reads suspend until the whole frame has
//! arrived; hitting EOF anywhere before that, header included, is a fatal
//! `ConnectionClosed`, never a partial message.

use crate::protocol::Message;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bytes of length prefix in front of every payload.
pub const HEADER_LEN: usize = 4;

/// Upper bound on a single payload. A full snapshot of the 15x13 arena is a
/// few kilobytes, so a prefix anywhere near this bound is a corrupt stream.
pub const MAX_FRAME_LEN: u32 = 1024 * 1024;

/// Everything that can go wrong on the wire, per connection.
///
/// All variants except `Handshake` are fatal to the connection they occur
/// on; none of them is ever retried.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("frame length {0} exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(u32),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("handshake failed: expected WELCOME, got {0}")]
    Handshake(String),
}

/// Serializes one message into a complete frame, header included.
pub fn encode_frame(msg: &Message) -> Result<Vec<u8>, ProtocolError> {
    let payload = serde_json::to_vec(msg)?;
    if payload.len() > MAX_FRAME_LEN as usize {
        return Err(ProtocolError::FrameTooLarge(payload.len() as u32));
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Reads exactly one message, suspending until the full frame is in.
pub async fn read_message<R>(reader: &mut R) -> Result<Message, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    reader.read_exact(&mut header).await.map_err(map_eof)?;

    let len = u32::from_be_bytes(header);
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await.map_err(map_eof)?;

    Ok(serde_json::from_slice(&payload)?)
}

/// Writes one complete frame and flushes it.
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

// read_exact reports EOF as UnexpectedEof whether the stream ended cleanly
// between frames or mid-frame; both count as the peer being gone.
fn map_eof(err: io::Error) -> ProtocolError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(err)
    }
}
