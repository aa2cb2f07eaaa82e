use std::net::{AddrParseError, SocketAddr};

use serde::Deserialize;

pub const DEFAULT_STUN_PORT: u16 = 3478;

/// Top-level JSON configuration:
///
/// ```json
/// { "stun": { "local_host": "0.0.0.0", "local_port": 54320,
///             "servers": ["stun.example.com:3478", "stun2.example.com"] } }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub stun: STUNConfig,
}

impl NetworkConfig {
    pub fn from_json(data: &str) -> Result<NetworkConfig, serde_json::Error> {
        serde_json::from_str(data)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct STUNConfig {
    pub local_host: String,
    pub local_port: u16,
    pub servers: Vec<String>,
}

impl Default for STUNConfig {
    fn default() -> STUNConfig {
        STUNConfig {
            local_host: String::from("0.0.0.0"),
            local_port: 54320,
            servers: Vec::new(),
        }
    }
}

impl STUNConfig {
    pub fn local_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.local_host.parse()?, self.local_port))
    }

    /// Configured servers as "host:port" endpoints, filling in the default
    /// STUN port where an entry omits it.
    pub fn server_endpoints(&self) -> Vec<String> {
        self.servers
            .iter()
            .map(|server| {
                if server.contains(':') {
                    server.clone()
                } else {
                    format!("{}:{}", server, DEFAULT_STUN_PORT)
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config = NetworkConfig::from_json(
            r#"{ "stun": { "local_host": "127.0.0.1", "local_port": 4000,
                           "servers": ["stun.example.com:3478", "stun2.example.com"] } }"#,
        )
        .unwrap();

        assert_eq!(config.stun.local_host, "127.0.0.1");
        assert_eq!(config.stun.local_port, 4000);
        assert_eq!(
            config.stun.local_addr().unwrap(),
            "127.0.0.1:4000".parse().unwrap()
        );
        assert_eq!(
            config.stun.server_endpoints(),
            ["stun.example.com:3478", "stun2.example.com:3478"]
        );
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = NetworkConfig::from_json("{}").unwrap();
        assert_eq!(config.stun.local_host, "0.0.0.0");
        assert_eq!(config.stun.local_port, 54320);
        assert!(config.stun.servers.is_empty());

        let config = NetworkConfig::from_json(r#"{ "stun": {} }"#).unwrap();
        assert_eq!(config.stun.local_port, 54320);
    }

    #[test]
    fn invalid_local_host_is_rejected() {
        let config = NetworkConfig::from_json(r#"{ "stun": { "local_host": "not-an-ip" } }"#)
            .unwrap();
        assert!(config.stun.local_addr().is_err());
    }
}
