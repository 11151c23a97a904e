//! Handshake-routing TCP proxy implementation.
//!
//! This module provides:
//! - Wire-format primitives (VarInt, unsigned short)
//! - Handshake packet parsing with replay capture
//! - Domain-to-backend routing
//! - Backend dialing and bidirectional relay
//! - The accept loop tying it all together
//!
//! ## Architecture
//!
//! ```text
//! Client -> Gateway -> ReplayReader -> Handshake Parser -> ServerMapping
//!                                                               |
//!                      Backend <- replayed bytes <- splice <- dial
//! ```

mod handshake;
mod listener;
mod relay;
mod replay;
mod router;
mod wire;

pub use handshake::{read_handshake, Handshake};
pub use listener::{Gateway, GatewayStats, SessionError};
pub use relay::{connect_backend, splice, DEFAULT_CONNECT_TIMEOUT};
pub use replay::ReplayReader;
pub use router::{routing_key, validate_addr, AddrError, MappingError, RouteDecision, ServerMapping};
pub use wire::{read_byte, read_string, read_unsigned_short, read_var_int, HandshakeError};
