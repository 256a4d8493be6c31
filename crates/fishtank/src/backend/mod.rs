//! The narrow contract the orchestration engine requires from the container
//! runtime. The engine only depends on this trait; the production
//! implementation shells out to the docker CLI (see [`docker::Docker`]).

pub mod docker;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use color_eyre::eyre;

pub use docker::Docker;

/// Resource labels, the only discovery mechanism in the system.
pub type Labels = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateNetworkOptions {
    pub attachable: bool,
    pub internal: bool,
    pub labels: Labels,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub name: Option<String>,
    pub hostname: Option<String>,
    pub networks: Vec<String>,
    /// Container-internal TCP ports published to ephemeral host ports.
    pub ports: Vec<u16>,
    /// Host directory to container path mounts.
    pub volumes: Vec<(PathBuf, String)>,
    pub labels: Labels,
    /// Arguments passed to the container entrypoint.
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Host ports a container's internal ports are published to, keyed by the
/// container-internal port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortMappings {
    pub tcp: BTreeMap<u16, u16>,
    pub udp: BTreeMap<u16, u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub ports: PortMappings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub labels: Labels,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    pub force: bool,
    pub volumes: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveNetworkOptions {
    pub force: bool,
}

/// Contract against the container runtime collaborator.
///
/// Implementations must fail descriptively on runtime command failures
/// (command, exit code, captured output; see [`crate::error::CommandError`])
/// and must treat `remove`/`remove_networks` with an empty name list as a
/// no-op: the runtime is never invoked with zero targets.
#[async_trait]
pub trait ContainerBackend: Send + Sync {
    async fn create_network(&self, name: &str, options: &CreateNetworkOptions)
        -> eyre::Result<()>;

    /// Launch a detached container. Fire-and-forget: the engine does not
    /// cancel a launch mid-flight.
    async fn run_detached(&self, image: &str, options: &RunOptions) -> eyre::Result<()>;

    async fn inspect(&self, name: &str) -> eyre::Result<ContainerInfo>;

    async fn list(&self, options: &ListOptions) -> eyre::Result<Vec<ContainerDetails>>;

    async fn remove(&self, names: &[String], options: &RemoveOptions) -> eyre::Result<()>;

    async fn remove_networks(
        &self,
        names: &[String],
        options: &RemoveNetworkOptions,
    ) -> eyre::Result<()>;
}
