//! Cluster lifecycle: the isolated network, bootstrap and member node
//! provisioning, convergence, and label-scoped teardown.
//!
//! Discovery is label-based only. The engine keeps no in-process registry of
//! live resources; every query goes back to the backend, which makes
//! discovery correct across process restarts.

use std::collections::BTreeSet;
use std::sync::Arc;

use color_eyre::eyre;
use futures::future::try_join_all;
use tokio::time::Instant;
use tracing::info;

use crate::backend::{
    ContainerBackend, CreateNetworkOptions, Docker, Labels, ListOptions, RemoveNetworkOptions,
    RemoveOptions, RunOptions,
};
use crate::config::{Config, InternalSettings, NetworkDefinition, NodeConfig, CONTAINER_DATADIR, RPC_TCP_PORT};
use crate::naming;
use crate::node::{MineUntil, Node};
use crate::wait::{loop_with_timeout, Readiness, WaitOptions};

/// Label carried by every resource the engine creates; the only mechanism
/// for resource discovery and teardown scoping.
pub const CLUSTER_LABEL: &str = "fishtank.cluster";
/// Label distinguishing designated bootstrap nodes.
pub const NODE_ROLE_LABEL: &str = "fishtank.node.role";
pub const BOOTSTRAP_NODE_ROLE: &str = "bootstrap";

pub const DEFAULT_BOOTSTRAP_NODE_NAME: &str = "bootstrap";

#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    pub bootstrap: BootstrapMode,
}

/// Whether `init` provisions a bootstrap node after creating the network.
#[derive(Debug, Clone, Default)]
pub enum BootstrapMode {
    #[default]
    Default,
    Disabled,
    Custom(BootstrapOptions),
}

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub node_name: Option<String>,
    pub node_image: Option<String>,
    /// Block until the node reports itself started.
    pub wait_for_start: bool,
    /// Mine the chain past genesis before returning.
    pub mine: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self { node_name: None, node_image: None, wait_for_start: true, mine: true }
    }
}

#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub name: String,
    pub image: Option<String>,
    pub config: Option<NodeConfig>,
    pub internal: Option<InternalSettings>,
    pub network_definition: Option<NetworkDefinition>,
    pub wait_for_start: bool,
}

impl SpawnOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: None,
            config: None,
            internal: None,
            network_definition: None,
            wait_for_start: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConvergenceOptions {
    /// Nodes that must converge; empty means every cluster node.
    pub nodes: Vec<Node>,
    /// One time budget for both convergence phases.
    pub wait: WaitOptions,
}

struct InternalSpawnOptions {
    name: String,
    image: Option<String>,
    config: Option<NodeConfig>,
    internal: Option<InternalSettings>,
    network_definition: Option<NetworkDefinition>,
    bootstrap_nodes: Vec<String>,
    extra_labels: Labels,
    wait_for_start: bool,
}

/// A named, isolated network plus the set of node containers attached to it.
pub struct Cluster {
    name: String,
    backend: Arc<dyn ContainerBackend>,
    config: Config,
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub struct ClusterBuilder {
    name: String,
    backend: Option<Arc<dyn ContainerBackend>>,
    config: Option<Config>,
}

impl ClusterBuilder {
    pub fn backend(mut self, backend: Arc<dyn ContainerBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> eyre::Result<Cluster> {
        naming::assert_valid_name(&self.name)?;
        Ok(Cluster {
            name: self.name,
            backend: self.backend.unwrap_or_else(|| Arc::new(Docker::new())),
            config: self.config.unwrap_or_else(Config::from_env),
        })
    }
}

impl Cluster {
    /// Create a cluster handle backed by the docker CLI and the environment
    /// configuration. Fails if `name` is not a valid identifier.
    pub fn new(name: impl Into<String>) -> eyre::Result<Self> {
        Self::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> ClusterBuilder {
        ClusterBuilder { name: name.into(), backend: None, config: None }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn cluster_labels(&self) -> Labels {
        let mut labels = Labels::new();
        labels.insert(CLUSTER_LABEL.to_string(), self.name.clone());
        labels
    }

    fn scratch_dir(&self) -> std::path::PathBuf {
        std::env::temp_dir().join("fishtank").join(&self.name)
    }

    /// Create the cluster's network and, unless disabled, bootstrap the
    /// first node. Re-initializing an existing cluster is an error surfaced
    /// by the backend (the network already exists).
    pub async fn init(&self, options: InitOptions) -> eyre::Result<()> {
        let network = naming::network_name(&self.name)?;
        self.backend
            .create_network(
                &network,
                &CreateNetworkOptions {
                    attachable: true,
                    internal: true,
                    labels: self.cluster_labels(),
                },
            )
            .await?;
        info!(cluster = %self.name, "created cluster network");

        match options.bootstrap {
            BootstrapMode::Default => self.bootstrap(BootstrapOptions::default()).await,
            BootstrapMode::Custom(bootstrap) => self.bootstrap(bootstrap).await,
            BootstrapMode::Disabled => Ok(()),
        }
    }

    /// Spawn a node carrying the bootstrap role label and, unless
    /// suppressed, mine the chain past genesis. Many chain operations are
    /// unreliable against an un-mined genesis node; mining two blocks here
    /// removes that race from every scenario.
    pub async fn bootstrap(&self, options: BootstrapOptions) -> eyre::Result<()> {
        let mut extra_labels = Labels::new();
        extra_labels.insert(NODE_ROLE_LABEL.to_string(), BOOTSTRAP_NODE_ROLE.to_string());

        let node = self
            .internal_spawn(InternalSpawnOptions {
                name: options
                    .node_name
                    .unwrap_or_else(|| DEFAULT_BOOTSTRAP_NODE_NAME.to_string()),
                image: options.node_image,
                config: None,
                internal: None,
                network_definition: None,
                bootstrap_nodes: Vec::new(),
                extra_labels,
                // Mining needs a reachable RPC server, so it implies the
                // start wait.
                wait_for_start: options.wait_for_start || options.mine,
            })
            .await?;

        if options.mine {
            node.mine_until(MineUntil::BlockSequence(2)).await?;
        }
        Ok(())
    }

    /// Spawn a member node. The current bootstrap node set is resolved live
    /// from the backend and injected into the generated configuration unless
    /// the caller already supplied `bootstrap_nodes`.
    pub async fn spawn(&self, options: SpawnOptions) -> eyre::Result<Node> {
        let bootstrap_nodes = self
            .get_bootstrap_nodes()
            .await?
            .iter()
            .map(|node| node.name().to_string())
            .collect();

        self.internal_spawn(InternalSpawnOptions {
            name: options.name,
            image: options.image,
            config: options.config,
            internal: options.internal,
            network_definition: options.network_definition,
            bootstrap_nodes,
            extra_labels: Labels::new(),
            wait_for_start: options.wait_for_start,
        })
        .await
    }

    async fn internal_spawn(&self, options: InternalSpawnOptions) -> eyre::Result<Node> {
        let node = Node::new(&self.name, &options.name, Arc::clone(&self.backend))?;
        let data_dir = node.data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;

        // The caller's config value is never mutated; defaults are merged
        // into a fresh value that is what actually gets serialized.
        let config = options
            .config
            .unwrap_or_default()
            .with_spawn_defaults(&options.bootstrap_nodes);
        tokio::fs::write(data_dir.join("config.json"), serde_json::to_string(&config)?).await?;

        if let Some(internal) = &options.internal {
            tokio::fs::write(data_dir.join("internal.json"), serde_json::to_string(internal)?)
                .await?;
        }

        let mut args = vec!["start".to_string()];
        args.extend(self.config.extra_start_args.iter().cloned());

        if let Some(network_definition) = &options.network_definition {
            tokio::fs::write(
                data_dir.join("customNetwork.json"),
                serde_json::to_string(network_definition)?,
            )
            .await?;
            args.push("--customNetwork".to_string());
            args.push(format!("{CONTAINER_DATADIR}/customNetwork.json"));
        } else if let Some(network_id) = config.network_id {
            args.push("--networkId".to_string());
            args.push(network_id.to_string());
        }

        let mut labels = self.cluster_labels();
        labels.extend(options.extra_labels);

        let image = options.image.unwrap_or_else(|| self.config.default_image.clone());
        self.backend
            .run_detached(
                &image,
                &RunOptions {
                    name: Some(node.container_name().to_string()),
                    hostname: Some(options.name.clone()),
                    networks: vec![naming::network_name(&self.name)?],
                    ports: vec![RPC_TCP_PORT],
                    volumes: vec![(data_dir, CONTAINER_DATADIR.to_string())],
                    labels,
                    args,
                },
            )
            .await?;
        info!(cluster = %self.name, node = %options.name, %image, "launched node container");

        if options.wait_for_start {
            node.wait_for_start(WaitOptions::default()).await?;
        }
        Ok(node)
    }

    /// Nodes currently carrying the bootstrap role label.
    pub async fn get_bootstrap_nodes(&self) -> eyre::Result<Vec<Node>> {
        let mut labels = self.cluster_labels();
        labels.insert(NODE_ROLE_LABEL.to_string(), BOOTSTRAP_NODE_ROLE.to_string());
        self.nodes_from_list(&ListOptions { labels }).await
    }

    /// Re-derive node views from the backend's live container list. Node
    /// values are disposable; re-fetch whenever identity matters.
    pub async fn get_nodes(&self) -> eyre::Result<Vec<Node>> {
        self.nodes_from_list(&ListOptions { labels: self.cluster_labels() }).await
    }

    /// Linear scan by name over the live list; the backend is the source of
    /// truth, not a cached registry.
    pub async fn get_node(&self, name: &str) -> eyre::Result<Option<Node>> {
        Ok(self.get_nodes().await?.into_iter().find(|node| node.name() == name))
    }

    async fn nodes_from_list(&self, options: &ListOptions) -> eyre::Result<Vec<Node>> {
        let containers = self.backend.list(options).await?;
        let prefix = format!("{}_", self.name);
        containers
            .iter()
            .filter_map(|container| container.name.strip_prefix(&prefix))
            .map(|name| {
                Node::new(&self.name, name, Arc::clone(&self.backend)).map_err(Into::into)
            })
            .collect()
    }

    /// Wait until every target node is synced and all of them agree on one
    /// chain head, then until each node's wallet scan has caught up with its
    /// chain head. Both phases share `options.wait.timeout`: the scan phase
    /// only gets whatever the sync phase left over.
    pub async fn wait_for_convergence(&self, options: ConvergenceOptions) -> eyre::Result<()> {
        let nodes = if options.nodes.is_empty() {
            self.get_nodes().await?
        } else {
            options.nodes
        };
        if nodes.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        loop_with_timeout(options.wait, || Self::sync_check(&nodes)).await?;
        info!(cluster = %self.name, nodes = nodes.len(), "nodes synced to a single head");

        let scan_wait = WaitOptions {
            timeout: options.wait.timeout.saturating_sub(started.elapsed()),
            interval: options.wait.interval,
        };
        try_join_all(nodes.iter().map(|node| node.wait_for_scan(scan_wait))).await?;
        Ok(())
    }

    async fn sync_check(nodes: &[Node]) -> eyre::Result<Readiness> {
        let mut heads = BTreeSet::new();
        for node in nodes {
            let rpc = match node.connect_rpc().await {
                Ok(rpc) => rpc,
                Err(e) => return Ok(Readiness::not_ready(e.to_string())),
            };
            let report = match rpc.get_status().await {
                Ok(report) => report,
                Err(e) => return Ok(Readiness::not_ready(e.to_string())),
            };
            if !report.blockchain.synced {
                return Ok(Readiness::not_ready(format!("node {} is not synced", node.name())));
            }
            heads.insert(report.blockchain.head.hash);
        }
        // All nodes reporting synced with disagreeing heads is "not yet",
        // not an error.
        if heads.len() == 1 {
            Ok(Readiness::ready())
        } else {
            Ok(Readiness::not_ready(format!("nodes disagree on chain head: {heads:?}")))
        }
    }

    /// Remove every resource carrying the cluster's label: containers first
    /// (a network cannot be removed while containers are attached), then the
    /// network, then the on-disk scratch directory. Safe to call on a
    /// cluster with zero resources and safe to call twice.
    pub async fn teardown(&self) -> eyre::Result<()> {
        let containers = self
            .backend
            .list(&ListOptions { labels: self.cluster_labels() })
            .await?;
        let names: Vec<String> = containers.into_iter().map(|container| container.name).collect();
        self.backend
            .remove(&names, &RemoveOptions { force: true, volumes: true })
            .await?;

        self.backend
            .remove_networks(
                &[naming::network_name(&self.name)?],
                &RemoveNetworkOptions { force: true },
            )
            .await?;

        match tokio::fs::remove_dir_all(self.scratch_dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(cluster = %self.name, containers = names.len(), "tore down cluster resources");
        Ok(())
    }
}
