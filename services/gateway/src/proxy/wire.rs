//! Primitive wire-format decoding for the handshake packet.
//!
//! The handshake uses the Minecraft framing primitives: single bytes,
//! big-endian unsigned shorts, and VarInts (little-endian, 7 payload bits
//! per byte, continuation flag in bit 7, at most 5 bytes for a 32-bit
//! value). Everything reads one field at a time from the live socket and
//! never consumes bytes past the field it decodes.

use std::io;
use std::string::FromUtf8Error;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum number of bytes a 32-bit VarInt may occupy on the wire.
pub const MAX_VAR_INT_BYTES: u32 = 5;

/// Errors produced while decoding a handshake from the client stream.
///
/// Every variant is terminal for the affected connection only; the
/// connection is closed without sending any response.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The underlying stream failed or ended mid-field.
    #[error("failed to read from client stream: {0}")]
    Read(#[from] io::Error),

    /// A VarInt ran past the 5-byte limit for 32-bit values.
    #[error("VarInt is longer than {MAX_VAR_INT_BYTES} bytes")]
    VarIntTooLarge,

    /// The first packet was not a handshake (packet id 0).
    #[error("unexpected packet id {0}, expected handshake (0)")]
    UnexpectedPacketId(i32),

    /// The declared string length is not representable as a buffer size.
    #[error("invalid string length {0}")]
    InvalidStringLength(i32),

    /// The stream ended before the declared string length was satisfied.
    #[error("string truncated: expected {expected} bytes")]
    TruncatedString { expected: usize },

    /// The server address field was not valid UTF-8.
    #[error("server address is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

/// Read exactly one byte from the stream.
pub async fn read_byte<R>(reader: &mut R) -> Result<u8, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    Ok(reader.read_u8().await?)
}

/// Read a big-endian unsigned 16-bit integer.
pub async fn read_unsigned_short<R>(reader: &mut R) -> Result<u16, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    Ok(reader.read_u16().await?)
}

/// Decode a VarInt into a signed 32-bit integer.
///
/// Stops at the first byte without the continuation flag and never reads
/// past it. The fifth byte carries 4 significant bits; its upper bits wrap
/// into the sign bit, which is the wire format's own truncation behavior
/// for 32-bit quantities and is preserved here via wrapping shifts.
pub async fn read_var_int<R>(reader: &mut R) -> Result<i32, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let mut result: i32 = 0;
    let mut num_read: u32 = 0;
    loop {
        let byte = read_byte(reader).await?;
        let value = (byte & 0x7f) as i32;
        result |= value.wrapping_shl(7 * num_read);

        num_read += 1;
        if num_read > MAX_VAR_INT_BYTES {
            return Err(HandshakeError::VarIntTooLarge);
        }
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok(result)
}

/// Read a VarInt-length-prefixed UTF-8 string.
pub async fn read_string<R>(reader: &mut R) -> Result<String, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let length = read_var_int(reader).await?;
    let length =
        usize::try_from(length).map_err(|_| HandshakeError::InvalidStringLength(length))?;

    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            HandshakeError::TruncatedString { expected: length }
        } else {
            HandshakeError::Read(e)
        }
    })?;

    Ok(String::from_utf8(buf)?)
}
