//! Length-prefixed frames.
//!
//! A frame is `u32 length | payload[length]`, big-endian. The length is
//! validated before any payload byte is read, so an oversized prefix costs
//! exactly four bytes of input.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame payload.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Reads one frame into `buf` and returns its payload.
///
/// `buf` is cleared first and may come from a [`crate::BufferPool`]; the
/// returned [`Bytes`] shares its allocation until dropped.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameLengthInvalid`] for a zero or oversized
/// length, or an I/O error (including `UnexpectedEof` when the peer closes).
pub async fn read_frame<R>(reader: &mut R, buf: &mut BytesMut) -> ProtocolResult<Bytes>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await?;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameLengthInvalid(len));
    }

    buf.clear();
    buf.resize(len as usize, 0);
    reader.read_exact(&mut buf[..]).await?;
    Ok(buf.split().freeze())
}

/// Writes `payload` as one frame.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameLengthInvalid`] if the payload is empty or
/// above the cap, or an I/O error.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> ProtocolResult<()>
where
    W: AsyncWrite + Unpin,
{
    let len = checked_len(payload.len())?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Validates a payload length against the frame cap.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameLengthInvalid`] when out of range.
pub fn checked_len(len: usize) -> ProtocolResult<u32> {
    match u32::try_from(len) {
        Ok(n) if n > 0 && n <= MAX_FRAME_LEN => Ok(n),
        Ok(n) => Err(ProtocolError::FrameLengthInvalid(n)),
        Err(_) => Err(ProtocolError::FrameLengthInvalid(u32::MAX)),
    }
}
