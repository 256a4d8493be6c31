//! Ephemeral docker clusters of Iron Fish nodes for integration testing.
//!
//! A [`Cluster`] owns an isolated docker network plus the set of node
//! containers attached to it. Nodes are spawned with generated configuration
//! mounted into the container, driven forward with [`Node::mine_until`], and
//! reaped through label-scoped [`Cluster::teardown`]. The docker runtime is
//! only reached through the [`backend::ContainerBackend`] trait, so every
//! orchestration path can be exercised against a mock backend.

pub mod backend;
pub mod cluster;
pub mod config;
pub mod error;
pub mod naming;
pub mod node;
pub mod rpc;
pub mod wait;

pub use backend::{
    ContainerBackend, ContainerDetails, ContainerInfo, CreateNetworkOptions, Docker, Labels,
    ListOptions, PortMappings, RemoveNetworkOptions, RemoveOptions, RunOptions,
};
pub use cluster::{
    BootstrapMode, BootstrapOptions, Cluster, ClusterBuilder, ConvergenceOptions, InitOptions,
    SpawnOptions, BOOTSTRAP_NODE_ROLE, CLUSTER_LABEL, DEFAULT_BOOTSTRAP_NODE_NAME, NODE_ROLE_LABEL,
};
pub use config::{
    Config, InternalSettings, NetworkDefinition, NodeConfig, CONTAINER_DATADIR, DEFAULT_NETWORK_ID,
    DEFAULT_NODE_IMAGE, RPC_TCP_PORT,
};
pub use error::{CommandError, InvalidNameError, RpcError, TimeoutError};
pub use node::{MineOptions, MineUntil, Node, NodeStatus};
pub use wait::{loop_with_timeout, Readiness, WaitOptions};
