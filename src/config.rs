//! INI file + CLI-flag configuration surface (C12).
//!
//! Recognizes the `[DHT]`/`[BOOTSTRAP]` sections and top-level `HOSTKEY`/
//! `LOG` keys, parsed with `rust-ini`. CLI flags (`crate::cli::Cli`) are
//! layered on top and win on conflict.

use crate::cli::Cli;
use crate::error::{ChordError, ChordResult};
use ini::Ini;

/// `grpc_port = client_port + PEER_PORT_OFFSET`: the peer RPC listener
/// always runs at a fixed offset above the client-facing TCP port.
pub const PEER_PORT_OFFSET: u16 = 3086;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 7500;

/// Fully resolved configuration for one running node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub bootstrap: Option<(String, u16)>,
    pub hostkey_path: Option<String>,
    pub log_path: Option<String>,
    pub dev_mode: bool,
}

impl NodeConfig {
    pub fn client_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn peer_address(&self) -> String {
        format!("{}:{}", self.host, self.port + PEER_PORT_OFFSET)
    }

    pub fn bootstrap_client_address(&self) -> Option<String> {
        self.bootstrap.as_ref().map(|(h, p)| format!("{h}:{p}"))
    }

    pub fn bootstrap_peer_address(&self) -> Option<String> {
        self.bootstrap.as_ref().map(|(h, p)| format!("{}:{}", h, p + PEER_PORT_OFFSET))
    }

    /// Loads the INI file named by `cli.config` (if it exists) and layers
    /// `cli`'s flags over it; an absent config file is not an error, since
    /// a bootstrap-less node can run from CLI flags alone.
    pub fn load(cli: &Cli) -> ChordResult<NodeConfig> {
        let ini = if std::path::Path::new(&cli.config).exists() {
            Some(Ini::load_from_file(&cli.config).map_err(|e| ChordError::InvalidArgument(format!("parsing {}: {e}", cli.config)))?)
        } else {
            None
        };

        let ini_get = |section: &str, key: &str| -> Option<String> {
            ini.as_ref().and_then(|i| i.section(Some(section))).and_then(|s| s.get(key)).map(str::to_owned)
        };
        let ini_get_top = |key: &str| -> Option<String> { ini.as_ref().and_then(|i| i.section(None::<String>)).and_then(|s| s.get(key)).map(str::to_owned) };

        let host = cli.host.clone().or_else(|| ini_get("DHT", "HOSTNAME")).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli
            .port
            .or_else(|| ini_get("DHT", "PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(DEFAULT_PORT);

        let bootstrap_host = cli.bootstrap_host.clone().or_else(|| ini_get("BOOTSTRAP", "OVERLAY_HOSTNAME"));
        let bootstrap_port = cli.bootstrap_port.or_else(|| ini_get("BOOTSTRAP", "PORT").and_then(|v| v.parse().ok()));
        let bootstrap = match (bootstrap_host, bootstrap_port) {
            (Some(h), Some(p)) => Some((h, p)),
            _ => None,
        };

        let hostkey_path = cli.hostkey.clone().or_else(|| ini_get_top("HOSTKEY"));
        let log_path = ini_get_top("LOG");

        Ok(NodeConfig { host, port, bootstrap, hostkey_path, log_path, dev_mode: cli.dev_mode })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(overrides: impl FnOnce(&mut Cli)) -> Cli {
        let mut cli = Cli {
            host: None,
            port: None,
            bootstrap_host: None,
            bootstrap_port: None,
            hostkey: None,
            config: "/nonexistent/chordring-test.ini".to_string(),
            dev_mode: false,
        };
        overrides(&mut cli);
        cli
    }

    #[test]
    fn falls_back_to_builtin_defaults_when_nothing_is_set() {
        let config = NodeConfig::load(&cli(|_| {})).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.bootstrap.is_none());
    }

    #[test]
    fn cli_flag_overrides_default() {
        let config = NodeConfig::load(&cli(|c| c.port = Some(9001))).unwrap();
        assert_eq!(config.port, 9001);
    }

    #[test]
    fn peer_address_is_client_port_plus_offset() {
        let config = NodeConfig::load(&cli(|c| c.port = Some(7500))).unwrap();
        assert_eq!(config.peer_address(), format!("{}:{}", DEFAULT_HOST, 7500 + PEER_PORT_OFFSET));
    }

    #[test]
    fn ini_file_is_layered_under_cli_flags() {
        let dir = std::env::temp_dir().join(format!("chordring-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.ini");
        std::fs::write(&path, "[DHT]\nHOSTNAME=10.0.0.1\nPORT=8000\n").unwrap();

        let mut c = cli(|_| {});
        c.config = path.to_str().unwrap().to_string();
        let config = NodeConfig::load(&c).unwrap();
        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 8000);

        c.port = Some(9999);
        let overridden = NodeConfig::load(&c).unwrap();
        assert_eq!(overridden.port, 9999);
        assert_eq!(overridden.host, "10.0.0.1");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
