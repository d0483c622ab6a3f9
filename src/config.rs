//! Runtime constants and the on-disk configuration tree.
//!
//! All tunable defaults are collected here so they can be found and
//! adjusted in a single place. `EngineConfig` is the concrete, TOML-backed
//! realization of the abstract "structured configuration tree" the engine
//! consumes (packet dissection, flow tracking, and trigger evaluation never
//! touch a file directly).

use serde::Deserialize;

use crate::error::SentinelError;
use crate::trigger::{Direction, IpProtocol};

/// Default ban duration applied when a trigger does not override it (seconds).
pub const DEFAULT_EXPIRY_SECS: u64 = 60;

/// Per-readiness-event packet drain budget, matching the bounded batch the
/// event loop pulls off the packet source before yielding.
pub const PACKET_DRAIN_BUDGET: usize = 5000;

/// Window (seconds) over which the IP-state rate estimator smooths pps/mbps.
pub const RATE_WINDOW_SECS: f64 = 1.0;

/// Top-level configuration tree, deserialized from TOML.
///
/// ```toml
/// expiry = 10
/// queue = 0
///
/// [[trigger]]
/// protocol = "udp"
/// target_pps = 1000
/// action_direction = "destination"
/// actions = ["log"]
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EngineConfig {
    /// Default ban duration in seconds, used when a trigger has no override.
    #[serde(default = "default_expiry")]
    pub expiry: u64,

    /// Kernel queue identifier the source module should bind (informational;
    /// the actual bind is performed by the packet-source adapter).
    #[serde(default)]
    pub queue: Option<u32>,

    /// Network interface name for adapters that bind by interface rather
    /// than by NFQUEUE id (e.g. `LinuxRawSocketSource`).
    #[serde(default)]
    pub interface: Option<String>,

    /// Compiled trigger definitions, in configuration order.
    #[serde(rename = "trigger", default)]
    pub triggers: Vec<TriggerConfig>,
}

fn default_expiry() -> u64 {
    DEFAULT_EXPIRY_SECS
}

/// One `[[trigger]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct TriggerConfig {
    pub protocol: ProtocolName,
    #[serde(default)]
    pub target_pps: u32,
    #[serde(default)]
    pub target_mbps: u32,
    #[serde(default)]
    pub flowcount: u32,
    #[serde(default)]
    pub below_mbps: u32,
    #[serde(default)]
    pub expiry: Option<u64>,
    #[serde(default)]
    pub action_direction: DirectionName,
    #[serde(default)]
    pub actions: Vec<String>,
}

/// The `protocol` keyword: `tcp`, `tcp-syn`, `udp`, or `icmp`.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolName {
    Tcp,
    TcpSyn,
    Udp,
    Icmp,
}

impl ProtocolName {
    /// Maps the config keyword onto the IP protocol number and the
    /// `tcp_syn_only` flag. `tcp-syn` is a pseudo-protocol: it resolves to
    /// TCP with the flag set rather than a distinct protocol number.
    pub fn resolve(self) -> (IpProtocol, bool) {
        match self {
            ProtocolName::Tcp => (IpProtocol::TCP, false),
            ProtocolName::TcpSyn => (IpProtocol::TCP, true),
            ProtocolName::Udp => (IpProtocol::UDP, false),
            ProtocolName::Icmp => (IpProtocol::ICMP, false),
        }
    }
}

/// The `action_direction` keyword: `source` or `destination` (default).
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DirectionName {
    Source,
    #[default]
    Destination,
}

impl From<DirectionName> for Direction {
    fn from(value: DirectionName) -> Self {
        match value {
            DirectionName::Source => Direction::Src,
            DirectionName::Destination => Direction::Dst,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, SentinelError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse configuration from an in-memory TOML string.
    pub fn from_str(contents: &str) -> Result<Self, SentinelError> {
        let config: EngineConfig = toml::de::from_str(contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_window_and_budget_positive() {
        assert!(RATE_WINDOW_SECS > 0.0);
        assert!(PACKET_DRAIN_BUDGET > 0);
        assert!(DEFAULT_EXPIRY_SECS > 0);
    }

    #[test]
    fn test_parse_minimal_config() {
        let cfg = EngineConfig::from_str("expiry = 10\n").unwrap();
        assert_eq!(cfg.expiry, 10);
        assert!(cfg.triggers.is_empty());
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let cfg = EngineConfig::from_str("").unwrap();
        assert_eq!(cfg.expiry, DEFAULT_EXPIRY_SECS);
        assert!(cfg.queue.is_none());
        assert!(cfg.triggers.is_empty());
    }

    #[test]
    fn test_parse_trigger_table() {
        let toml = r#"
            expiry = 10

            [[trigger]]
            protocol = "udp"
            target_pps = 1000
            action_direction = "destination"
            actions = ["log"]
        "#;
        let cfg = EngineConfig::from_str(toml).unwrap();
        assert_eq!(cfg.triggers.len(), 1);
        let t = &cfg.triggers[0];
        assert_eq!(t.target_pps, 1000);
        assert_eq!(t.actions, vec!["log".to_string()]);
        assert_eq!(t.action_direction, DirectionName::Destination);
    }

    #[test]
    fn test_tcp_syn_protocol_resolves_flag() {
        let (proto, syn_only) = ProtocolName::TcpSyn.resolve();
        assert_eq!(proto, IpProtocol::TCP);
        assert!(syn_only);
    }

    #[test]
    fn test_plain_tcp_protocol_does_not_set_syn_only() {
        let (proto, syn_only) = ProtocolName::Tcp.resolve();
        assert_eq!(proto, IpProtocol::TCP);
        assert!(!syn_only);
    }

    #[test]
    fn test_default_direction_is_destination() {
        let dir: Direction = DirectionName::default().into();
        assert_eq!(dir, Direction::Dst);
    }

    #[test]
    fn test_source_direction_conversion() {
        let dir: Direction = DirectionName::Source.into();
        assert_eq!(dir, Direction::Src);
    }

    #[test]
    fn test_parse_invalid_toml_is_config_error() {
        let err = EngineConfig::from_str("not valid toml = = =").unwrap_err();
        assert_eq!(err.kind(), "Config");
    }
}
