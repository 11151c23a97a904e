//! Handshake packet parsing.
//!
//! The first packet a client sends carries the domain it connected to,
//! which is the only field the gateway routes on. Parsing consumes the
//! packet from the live socket one field at a time; the caller wraps the
//! stream in a [`ReplayReader`](super::replay::ReplayReader) so the
//! consumed bytes can still be forwarded to the backend.

use tokio::io::AsyncRead;

use super::wire::{read_string, read_unsigned_short, read_var_int, HandshakeError};

/// A decoded handshake packet.
///
/// Constructed once per connection and never mutated; only
/// `server_address` feeds into routing, the rest is carried for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    /// Declared length of the remaining packet body. Informational only:
    /// upstream clients are lenient about it and so is the gateway, which
    /// deliberately does not reconcile it against the bytes actually
    /// consumed.
    pub length: i32,
    /// Packet id, always 0 for a handshake.
    pub packet_id: i32,
    /// Client protocol version, opaque to routing.
    pub protocol_version: i32,
    /// Domain the client connected to. May carry a NUL-separated suffix
    /// appended by legacy clients; strip it with
    /// [`routing_key`](super::router::routing_key) before routing.
    pub server_address: String,
    /// Port the client connected to, opaque to routing.
    pub server_port: u16,
    /// Requested next protocol phase (1 = status, 2 = login), opaque to
    /// routing.
    pub next_state: i32,
}

/// Read one complete handshake packet from the stream.
///
/// Any field-level failure aborts the parse with that field's error; no
/// partial packet is ever returned.
pub async fn read_handshake<R>(reader: &mut R) -> Result<Handshake, HandshakeError>
where
    R: AsyncRead + Unpin,
{
    let length = read_var_int(reader).await?;

    let packet_id = read_var_int(reader).await?;
    if packet_id != 0 {
        return Err(HandshakeError::UnexpectedPacketId(packet_id));
    }

    let protocol_version = read_var_int(reader).await?;
    let server_address = read_string(reader).await?;
    let server_port = read_unsigned_short(reader).await?;
    let next_state = read_var_int(reader).await?;

    Ok(Handshake {
        length,
        packet_id,
        protocol_version,
        server_address,
        server_port,
        next_state,
    })
}
