pub mod config;
pub mod proxy;

pub use proxy::{
    read_handshake, routing_key, Gateway, GatewayStats, Handshake, HandshakeError, ReplayReader,
    RouteDecision, ServerMapping, SessionError,
};
