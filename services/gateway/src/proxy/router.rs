//! Domain-to-backend routing.
//!
//! The routing table is an exact-match map from the domain a client
//! declared in its handshake to a backend address, with an optional
//! default for unmatched domains. It is loaded once at startup and never
//! mutated, so sessions share it behind an `Arc` without locking.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

/// Mapping from client-declared domains to backend addresses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerMapping {
    /// Backend used when no exact domain match exists.
    #[serde(default)]
    pub default: Option<String>,
    /// Exact-match domain routes.
    #[serde(default)]
    pub servers: HashMap<String, String>,
}

/// Outcome of resolving a routing key against the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision<'a> {
    /// Forward the connection to this backend address.
    Backend(&'a str),
    /// No match and no default. An expected outcome, not an error: the
    /// caller closes the connection without forwarding anything.
    NoRoute,
}

/// A mapping that failed load-time validation.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("empty domain in server mapping")]
    EmptyDomain,
    #[error("invalid address {addr:?} for domain {domain:?}: {reason}")]
    InvalidServerAddr {
        domain: String,
        addr: String,
        reason: AddrError,
    },
    #[error("invalid default address {addr:?}: {reason}")]
    InvalidDefaultAddr { addr: String, reason: AddrError },
}

#[derive(Debug, Error)]
pub enum AddrError {
    #[error("empty address")]
    Empty,
    #[error("missing port")]
    MissingPort,
    #[error("invalid port {0:?}")]
    InvalidPort(String),
}

impl ServerMapping {
    /// Check the invariants the proxy core assumes: every address is a
    /// syntactically valid host:port pair and no domain key is empty.
    pub fn validate(&self) -> Result<(), MappingError> {
        if let Some(default) = &self.default {
            validate_addr(default).map_err(|reason| MappingError::InvalidDefaultAddr {
                addr: default.clone(),
                reason,
            })?;
        }

        for (domain, addr) in &self.servers {
            if domain.is_empty() {
                return Err(MappingError::EmptyDomain);
            }
            validate_addr(addr).map_err(|reason| MappingError::InvalidServerAddr {
                domain: domain.clone(),
                addr: addr.clone(),
                reason,
            })?;
        }

        Ok(())
    }

    /// Resolve a routing key to a backend address.
    ///
    /// Exact match first, then the default backend if one is configured.
    pub fn resolve<'a>(&'a self, key: &str) -> RouteDecision<'a> {
        if let Some(addr) = self.servers.get(key) {
            return RouteDecision::Backend(addr);
        }
        match &self.default {
            Some(addr) => RouteDecision::Backend(addr),
            None => RouteDecision::NoRoute,
        }
    }
}

/// Reduce a handshake domain to its routing key.
///
/// Legacy clients append extra fields after a NUL separator (e.g.
/// `"host\0FML\0"`); only the prefix is a real hostname.
pub fn routing_key(domain: &str) -> &str {
    match domain.find('\0') {
        Some(i) => &domain[..i],
        None => domain,
    }
}

/// Check that an address is a syntactically valid host:port pair.
///
/// The host may be empty (`":25565"` binds all interfaces) or a bracketed
/// IPv6 literal; no resolution happens here.
pub fn validate_addr(addr: &str) -> Result<(), AddrError> {
    if addr.is_empty() {
        return Err(AddrError::Empty);
    }
    let (_, port) = addr.rsplit_once(':').ok_or(AddrError::MissingPort)?;
    if port.is_empty() || port.parse::<u16>().is_err() {
        return Err(AddrError::InvalidPort(port.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(default: Option<&str>, servers: &[(&str, &str)]) -> ServerMapping {
        ServerMapping {
            default: default.map(str::to_string),
            servers: servers
                .iter()
                .map(|(d, a)| (d.to_string(), a.to_string()))
                .collect(),
        }
    }

    #[test]
    fn exact_match_wins_over_default() {
        let m = mapping(Some("b:1"), &[("a.com", "x:2")]);
        assert_eq!(m.resolve("a.com"), RouteDecision::Backend("x:2"));
    }

    #[test]
    fn default_covers_unmatched_domains() {
        let m = mapping(Some("b:1"), &[("a.com", "x:2")]);
        assert_eq!(m.resolve("z.com"), RouteDecision::Backend("b:1"));
    }

    #[test]
    fn no_default_yields_no_route() {
        let m = mapping(None, &[("a.com", "x:2")]);
        assert_eq!(m.resolve("z.com"), RouteDecision::NoRoute);
    }

    #[test]
    fn routing_key_strips_nul_suffix() {
        assert_eq!(routing_key("host\0forge"), "host");
        assert_eq!(routing_key("host"), "host");
        assert_eq!(routing_key("\0x"), "");
    }

    #[test]
    fn validate_rejects_empty_domain() {
        let m = mapping(None, &[("", "x:2")]);
        assert!(matches!(m.validate(), Err(MappingError::EmptyDomain)));
    }

    #[test]
    fn validate_rejects_bad_addresses() {
        assert!(validate_addr("").is_err());
        assert!(validate_addr("no-port").is_err());
        assert!(validate_addr("host:").is_err());
        assert!(validate_addr("host:notaport").is_err());
        assert!(validate_addr("host:99999").is_err());

        assert!(validate_addr("host:25565").is_ok());
        assert!(validate_addr(":25565").is_ok());
        assert!(validate_addr("[::1]:25565").is_ok());
    }

    #[test]
    fn deserializes_with_optional_fields() {
        let m: ServerMapping =
            serde_json::from_str(r#"{"servers": {"a.com": "x:2"}}"#).unwrap();
        assert!(m.default.is_none());
        assert_eq!(m.resolve("a.com"), RouteDecision::Backend("x:2"));

        let m: ServerMapping = serde_json::from_str(r#"{"default": "b:1"}"#).unwrap();
        assert_eq!(m.resolve("anything"), RouteDecision::Backend("b:1"));
    }
}
