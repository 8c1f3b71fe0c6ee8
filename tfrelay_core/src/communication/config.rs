/// Configuration file support for transform buses
///
/// Buses are described in TOML/YAML instead of being hardcoded. The file
/// format is auto-detected from the extension.
use super::local::LocalSegment;
use super::traits::{BusTransport, TransformBus};
use super::udp::UdpBus;
use crate::error::{RelayError, RelayResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::sync::Arc;

/// One side of the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    /// Name this handle publishes under
    pub authority: String,

    /// Transport type: "local" (default) or "udp"
    #[serde(default)]
    pub transport: Option<String>,

    /// Segment name for local transport (defaults to the authority)
    #[serde(default)]
    pub segment: Option<String>,

    /// Bind address for UDP transport (e.g. "0.0.0.0:7400")
    #[serde(default)]
    pub bind: Option<String>,

    /// Peer addresses for UDP transport
    #[serde(default)]
    pub peers: Vec<String>,
}

/// Bus definitions for both sides of a bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusPairConfig {
    pub a: BusConfig,
    pub b: BusConfig,
}

impl BusConfig {
    /// In-process bus attached to `segment`
    pub fn local(authority: &str, segment: &str) -> Self {
        Self {
            authority: authority.to_string(),
            transport: Some("local".to_string()),
            segment: Some(segment.to_string()),
            bind: None,
            peers: Vec::new(),
        }
    }

    /// UDP bus bound to `bind`, sending to `peers`
    pub fn udp(authority: &str, bind: &str, peers: &[&str]) -> Self {
        Self {
            authority: authority.to_string(),
            transport: Some("udp".to_string()),
            segment: None,
            bind: Some(bind.to_string()),
            peers: peers.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Resolve the transport type
    pub fn transport(&self) -> RelayResult<BusTransport> {
        match self.transport.as_deref() {
            Some("local") | None => Ok(BusTransport::Local),
            Some("udp") => Ok(BusTransport::Udp),
            Some(unknown) => Err(RelayError::transport_init(format!(
                "bus '{}': unknown transport '{}'",
                self.authority, unknown
            ))),
        }
    }

    /// Open the bus described by this config
    pub fn build(&self) -> RelayResult<Arc<dyn TransformBus>> {
        match self.transport()? {
            BusTransport::Local => {
                let segment_name = self.segment.as_deref().unwrap_or(&self.authority);
                let bus = LocalSegment::named(segment_name).attach(&self.authority)?;
                Ok(Arc::new(bus))
            }
            BusTransport::Udp => {
                let bind = self.bind.as_deref().ok_or_else(|| {
                    RelayError::transport_init(format!(
                        "bus '{}': udp transport requires 'bind'",
                        self.authority
                    ))
                })?;
                let bind = resolve_addr(&self.authority, bind)?;
                let peers = self
                    .peers
                    .iter()
                    .map(|p| resolve_addr(&self.authority, p))
                    .collect::<RelayResult<Vec<_>>>()?;
                if peers.is_empty() {
                    log::warn!(
                        "bus '{}': udp transport has no peers, publishes go nowhere",
                        self.authority
                    );
                }
                Ok(Arc::new(UdpBus::bind(&self.authority, bind, peers)?))
            }
        }
    }
}

fn resolve_addr(authority: &str, addr: &str) -> RelayResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|e| {
            RelayError::transport_init(format!(
                "bus '{}': invalid address '{}': {}",
                authority, addr, e
            ))
        })?
        .next()
        .ok_or_else(|| {
            RelayError::transport_init(format!(
                "bus '{}': address '{}' resolved to nothing",
                authority, addr
            ))
        })
}

/// Load a config file (auto-detect format)
pub fn load_config_file<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> RelayResult<T> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        RelayError::parse(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    // Auto-detect format based on extension
    let extension = path.extension().and_then(|s| s.to_str());
    match extension {
        Some("toml") => from_toml(&contents),
        Some("yaml") | Some("yml") => from_yaml(&contents),
        _ => {
            // Try both formats
            from_toml(&contents).or_else(|_| from_yaml(&contents))
        }
    }
}

/// Parse config from TOML string
pub fn from_toml<T: DeserializeOwned>(contents: &str) -> RelayResult<T> {
    toml::from_str(contents).map_err(|e| RelayError::parse(format!("failed to parse TOML: {}", e)))
}

/// Parse config from YAML string
pub fn from_yaml<T: DeserializeOwned>(contents: &str) -> RelayResult<T> {
    serde_yaml::from_str(contents)
        .map_err(|e| RelayError::parse(format!("failed to parse YAML: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [a]
            authority = "rsb-side"
            transport = "local"
            segment = "robot"

            [b]
            authority = "ros-side"
            transport = "udp"
            bind = "127.0.0.1:0"
            peers = ["127.0.0.1:7401"]
        "#;

        let config: BusPairConfig = from_toml(toml_str).unwrap();
        assert_eq!(config.a.transport().unwrap(), BusTransport::Local);
        assert_eq!(config.a.segment.as_deref(), Some("robot"));
        assert_eq!(config.b.transport().unwrap(), BusTransport::Udp);
        assert_eq!(config.b.peers, vec!["127.0.0.1:7401".to_string()]);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml_str = r#"
            a:
              authority: rsb-side
            b:
              authority: ros-side
              transport: udp
              bind: 127.0.0.1:0
        "#;

        let config: BusPairConfig = from_yaml(yaml_str).unwrap();
        assert_eq!(config.a.transport().unwrap(), BusTransport::Local);
        assert!(config.b.peers.is_empty());
    }

    #[test]
    fn test_unknown_transport() {
        let mut config = BusConfig::local("a", "seg");
        config.transport = Some("carrier-pigeon".to_string());
        assert!(matches!(
            config.build(),
            Err(RelayError::TransportInit(_))
        ));
    }

    #[test]
    fn test_udp_requires_bind() {
        let mut config = BusConfig::udp("a", "127.0.0.1:0", &[]);
        config.bind = None;
        assert!(matches!(
            config.build(),
            Err(RelayError::TransportInit(_))
        ));
    }

    #[test]
    fn test_build_local_and_udp() {
        let local = BusConfig::local("local-a", "test_build_local").build().unwrap();
        assert_eq!(local.authority_name(), "local-a");
        local.shutdown().unwrap();

        let udp = BusConfig::udp("udp-b", "127.0.0.1:0", &["127.0.0.1:9"])
            .build()
            .unwrap();
        assert_eq!(udp.authority_name(), "udp-b");
        udp.shutdown().unwrap();
    }

    #[test]
    fn test_load_file_by_extension() {
        use std::io::Write;

        let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(file, "a:\n  authority: rsb-side\nb:\n  authority: ros-side").unwrap();

        let config: BusPairConfig = load_config_file(file.path()).unwrap();
        assert_eq!(config.a.authority, "rsb-side");
        assert_eq!(config.b.authority, "ros-side");
    }

    #[test]
    fn test_missing_file_is_parse_error() {
        let result: RelayResult<BusPairConfig> = load_config_file("/nonexistent/bridge.toml");
        assert!(matches!(result, Err(RelayError::ConfigParse(_))));
    }
}
