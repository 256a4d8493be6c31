//! Engine configuration and the generated per-node configuration files.

use serde::{Deserialize, Serialize};

/// Image used for node and companion containers unless overridden.
pub const DEFAULT_NODE_IMAGE: &str = "ghcr.io/iron-fish/ironfish:latest";

/// Data directory inside the container; the node's scratch directory is
/// mounted here.
pub const CONTAINER_DATADIR: &str = "/root/.ironfish";

/// The container-internal TCP port the node's RPC server listens on. Always
/// published to an ephemeral host port; the host side is discovered through
/// backend inspection, never assumed.
pub const RPC_TCP_PORT: u16 = 8020;

/// Devnet network id, used when the caller does not pick a network.
pub const DEFAULT_NETWORK_ID: u64 = 2;

const NODE_IMAGE_ENV: &str = "FISHTANK_NODE_IMAGE";
const NODE_ARGS_ENV: &str = "FISHTANK_NODE_ARGS";

/// Engine-level configuration, loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub default_image: String,
    /// Extra arguments appended to every node's `start` command.
    pub extra_start_args: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self { default_image: DEFAULT_NODE_IMAGE.to_string(), extra_start_args: Vec::new() }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default_image =
            std::env::var(NODE_IMAGE_ENV).unwrap_or_else(|_| DEFAULT_NODE_IMAGE.to_string());
        let extra_start_args = std::env::var(NODE_ARGS_ENV)
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Self { default_image, extra_start_args }
    }
}

/// Node configuration overrides, serialized to `config.json` in the node's
/// data directory. Keys mirror the node's own configuration file format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_nodes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_rpc_tcp: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_rpc_tls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_tcp_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_tcp_port: Option<u16>,
}

impl NodeConfig {
    /// Produce a new configuration with spawn-time defaults merged in. The
    /// input is consumed, never mutated in place, so a caller-held config
    /// value is not changed behind its back.
    ///
    /// `bootstrap_nodes` is only defaulted when there are live bootstrap
    /// nodes to point at.
    pub(crate) fn with_spawn_defaults(mut self, bootstrap_nodes: &[String]) -> Self {
        if self.network_id.is_none() {
            self.network_id = Some(DEFAULT_NETWORK_ID);
        }
        if self.bootstrap_nodes.is_none() && !bootstrap_nodes.is_empty() {
            self.bootstrap_nodes = Some(bootstrap_nodes.to_vec());
        }
        self
    }
}

/// Internal/auth settings, serialized to `internal.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_auth_token: Option<String>,
}

/// A custom network definition, serialized to `customNetwork.json` and passed
/// to the node via `--customNetwork`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkDefinition {
    pub id: u64,
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn from_env_defaults() {
        std::env::remove_var(NODE_IMAGE_ENV);
        std::env::remove_var(NODE_ARGS_ENV);

        let config = Config::from_env();
        assert_eq!(config.default_image, DEFAULT_NODE_IMAGE);
        assert!(config.extra_start_args.is_empty());
    }

    #[test]
    #[serial]
    fn from_env_overrides() {
        std::env::set_var(NODE_IMAGE_ENV, "ironfish:nightly");
        std::env::set_var(NODE_ARGS_ENV, "--forceMining  --workers 2");

        let config = Config::from_env();
        assert_eq!(config.default_image, "ironfish:nightly");
        assert_eq!(config.extra_start_args, vec!["--forceMining", "--workers", "2"]);

        std::env::remove_var(NODE_IMAGE_ENV);
        std::env::remove_var(NODE_ARGS_ENV);
    }

    #[test]
    fn spawn_defaults_fill_network_and_bootstrap() {
        let merged =
            NodeConfig::default().with_spawn_defaults(&["my-bootstrap-node".to_string()]);
        assert_eq!(merged.network_id, Some(DEFAULT_NETWORK_ID));
        assert_eq!(merged.bootstrap_nodes, Some(vec!["my-bootstrap-node".to_string()]));
    }

    #[test]
    fn spawn_defaults_keep_caller_values() {
        let config = NodeConfig {
            network_id: Some(7),
            bootstrap_nodes: Some(vec!["other".to_string()]),
            ..NodeConfig::default()
        };
        let merged = config.clone().with_spawn_defaults(&["ignored".to_string()]);
        assert_eq!(merged, config);
    }

    #[test]
    fn spawn_defaults_skip_bootstrap_when_none_exist() {
        let merged = NodeConfig::default().with_spawn_defaults(&[]);
        assert_eq!(merged.bootstrap_nodes, None);
    }

    #[test]
    fn node_config_round_trips_through_json() {
        let config = NodeConfig { network_id: Some(7), ..NodeConfig::default() };
        let serialized = serde_json::to_string(&config).unwrap();
        assert_eq!(serialized, r#"{"networkId":7}"#);
        let deserialized: NodeConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, config);
    }
}
