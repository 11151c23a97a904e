//! Gateway configuration (env-driven).
//!
//! The proxy core never touches the environment; everything it needs is
//! loaded here into an explicit value object and handed to
//! [`Gateway::bind`](crate::proxy::Gateway::bind).

use anyhow::{bail, Context, Result};

use crate::proxy::{validate_addr, ServerMapping};

const ENV_LISTEN_ADDR: &str = "PROXY_LISTEN_ADDR";
const ENV_MAPPING: &str = "PROXY_MAPPING";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:25565";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the gateway listens on.
    pub listen_addr: String,

    /// Domain-to-backend routing table.
    pub mapping: ServerMapping,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON-formatted logs.
    pub log_json: bool,

    /// Whether `listen_addr` came from the environment or the default.
    pub listen_addr_defaulted: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let (listen_addr, listen_addr_defaulted) = match std::env::var(ENV_LISTEN_ADDR) {
            Ok(addr) => {
                validate_addr(&addr)
                    .with_context(|| format!("invalid {ENV_LISTEN_ADDR} {addr:?}"))?;
                (addr, false)
            }
            Err(_) => (DEFAULT_LISTEN_ADDR.to_string(), true),
        };

        let mapping_json = std::env::var(ENV_MAPPING)
            .with_context(|| format!("{ENV_MAPPING} environment variable is not set"))?;
        let mapping = parse_mapping(&mapping_json)?;

        let log_level = match std::env::var("LOG_LEVEL") {
            Ok(level) => {
                let level = level.to_lowercase();
                match level.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" => level,
                    other => bail!("unknown LOG_LEVEL {other:?}"),
                }
            }
            Err(_) => "info".to_string(),
        };

        let log_json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

        Ok(Self {
            listen_addr,
            mapping,
            log_level,
            log_json,
            listen_addr_defaulted,
        })
    }
}

/// Decode and validate a JSON server mapping.
pub fn parse_mapping(json: &str) -> Result<ServerMapping> {
    let mapping: ServerMapping =
        serde_json::from_str(json).with_context(|| format!("failed to decode {ENV_MAPPING}"))?;
    mapping
        .validate()
        .with_context(|| format!("invalid {ENV_MAPPING}"))?;
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::RouteDecision;

    #[test]
    fn parses_full_mapping() {
        let mapping = parse_mapping(
            r#"{"default": "fallback:25565", "servers": {"a.com": "10.0.0.1:25565"}}"#,
        )
        .unwrap();
        assert_eq!(
            mapping.resolve("a.com"),
            RouteDecision::Backend("10.0.0.1:25565")
        );
        assert_eq!(
            mapping.resolve("b.com"),
            RouteDecision::Backend("fallback:25565")
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_mapping("{not json").is_err());
    }

    #[test]
    fn rejects_invalid_backend_addr() {
        assert!(parse_mapping(r#"{"servers": {"a.com": "no-port"}}"#).is_err());
    }

    #[test]
    fn rejects_empty_domain() {
        assert!(parse_mapping(r#"{"servers": {"": "x:1"}}"#).is_err());
    }
}
