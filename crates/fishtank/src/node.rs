//! A cluster member: a disposable view over one node container, addressed by
//! name and label. Holds no lifecycle state of its own; the backend is the
//! source of truth, so a `Node` can never go stale.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{self, eyre};
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backend::{ContainerBackend, Labels, RemoveOptions, RunOptions};
use crate::cluster::CLUSTER_LABEL;
use crate::config::RPC_TCP_PORT;
use crate::error::InvalidNameError;
use crate::naming;
use crate::rpc::{RpcClient, TcpTransport};
use crate::wait::{loop_with_timeout, Readiness, WaitOptions, DEFAULT_POLL_INTERVAL};

/// Node lifecycle classification: `Stopped` means the RPC socket is not
/// reachable, `Error` means the node answered the connection but the status
/// query itself failed. Any other lifecycle state the node reports (such as
/// `"starting"`) is carried through verbatim so callers can tell a node that
/// is still coming up from one that is unhealthy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Started,
    Stopped,
    Reported(String),
    Error,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Started => f.write_str("started"),
            NodeStatus::Stopped => f.write_str("stopped"),
            NodeStatus::Reported(status) => f.write_str(status),
            NodeStatus::Error => f.write_str("error"),
        }
    }
}

/// Condition driving [`Node::mine_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineUntil {
    /// Done when the chain head sequence is at least this value.
    BlockSequence(u64),
    /// Done when the chain head has advanced this many blocks past the
    /// sequence observed when the call started.
    AdditionalBlocks(u64),
    /// Done when this transaction is mined on a block.
    TransactionMined(String),
    /// Done when the available wallet balance is at least this amount.
    AccountBalance(u128),
}

#[derive(Debug, Clone)]
pub struct MineOptions {
    /// Interval between condition polls. `mine_until` enforces no overall
    /// deadline of its own; scenarios bound total test time externally.
    pub interval: Duration,
    /// Mine through a companion pool process instead of a standalone miner.
    pub pool: bool,
}

impl Default for MineOptions {
    fn default() -> Self {
        Self { interval: DEFAULT_POLL_INTERVAL, pool: false }
    }
}

/// Internal resolved form of [`MineUntil`]: `AdditionalBlocks` collapses into
/// an absolute head sequence at call time.
#[derive(Debug, Clone)]
enum MineGoal {
    HeadSequence(u64),
    TransactionMined(String),
    AccountBalance(u128),
}

#[derive(Clone)]
pub struct Node {
    cluster_name: String,
    name: String,
    container_name: String,
    backend: Arc<dyn ContainerBackend>,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("cluster_name", &self.cluster_name)
            .field("name", &self.name)
            .finish()
    }
}

impl Node {
    pub(crate) fn new(
        cluster_name: &str,
        name: &str,
        backend: Arc<dyn ContainerBackend>,
    ) -> Result<Self, InvalidNameError> {
        let container_name = naming::container_name(cluster_name, name)?;
        Ok(Self {
            cluster_name: cluster_name.to_string(),
            name: name.to_string(),
            container_name,
            backend,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Per-node scratch directory holding the generated config files, mounted
    /// into the container as its data directory.
    pub fn data_dir(&self) -> PathBuf {
        std::env::temp_dir()
            .join("fishtank")
            .join(&self.cluster_name)
            .join(&self.name)
            .join(".ironfish")
    }

    /// Forcefully remove the node's container and its volumes.
    pub async fn remove(&self) -> eyre::Result<()> {
        self.backend
            .remove(
                std::slice::from_ref(&self.container_name),
                &RemoveOptions { force: true, volumes: true },
            )
            .await
    }

    /// The image the node's container is running, used for companion
    /// processes so miner and node always match.
    pub async fn get_image(&self) -> eyre::Result<String> {
        Ok(self.backend.inspect(&self.container_name).await?.image)
    }

    /// Host port the node's RPC TCP port is published on. The mapping is
    /// chosen by the runtime at launch, so it is always discovered through
    /// inspection.
    pub async fn get_rpc_tcp_port(&self) -> eyre::Result<u16> {
        let info = self.backend.inspect(&self.container_name).await?;
        info.ports.tcp.get(&RPC_TCP_PORT).copied().ok_or_else(|| {
            eyre!(
                "container {} does not publish the RPC TCP port {}; \
                 was the node spawned with external RPC enabled?",
                self.container_name,
                RPC_TCP_PORT
            )
        })
    }

    /// Connect to the node's RPC socket through the published host port.
    pub async fn connect_rpc(&self) -> eyre::Result<RpcClient> {
        let port = self.get_rpc_tcp_port().await?;
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let transport = TcpTransport::connect(addr).await?;
        Ok(RpcClient::new(transport))
    }

    /// Classify the node's lifecycle state; see [`NodeStatus`].
    pub async fn get_status(&self) -> NodeStatus {
        let rpc = match self.connect_rpc().await {
            Ok(rpc) => rpc,
            Err(_) => return NodeStatus::Stopped,
        };
        match rpc.get_status().await {
            Ok(report) => match report.node.status.as_str() {
                "started" => NodeStatus::Started,
                "stopped" => NodeStatus::Stopped,
                other => NodeStatus::Reported(other.to_string()),
            },
            Err(_) => NodeStatus::Error,
        }
    }

    /// Wait until the node reports itself started.
    pub async fn wait_for_start(&self, options: WaitOptions) -> eyre::Result<()> {
        loop_with_timeout(options, || self.start_check()).await
    }

    async fn start_check(&self) -> eyre::Result<Readiness> {
        match self.get_status().await {
            NodeStatus::Started => Ok(Readiness::ready()),
            status => Ok(Readiness::not_ready(format!(
                "node {} status: {status}",
                self.name
            ))),
        }
    }

    /// Wait until the wallet scan head has caught up with the chain head.
    pub async fn wait_for_scan(&self, options: WaitOptions) -> eyre::Result<()> {
        loop_with_timeout(options, || self.scan_check()).await
    }

    async fn scan_check(&self) -> eyre::Result<Readiness> {
        // Transient RPC failures count as "not ready": the node may be
        // restarting between polls, and the timeout bounds how long that can
        // go on.
        let rpc = match self.connect_rpc().await {
            Ok(rpc) => rpc,
            Err(e) => return Ok(Readiness::not_ready(e.to_string())),
        };
        let report = match rpc.get_status().await {
            Ok(report) => report,
            Err(e) => return Ok(Readiness::not_ready(e.to_string())),
        };
        match &report.accounts.head {
            Some(head) if head.hash == report.blockchain.head.hash => Ok(Readiness::ready()),
            Some(head) => Ok(Readiness::not_ready(format!(
                "node {}: wallet scan at sequence {}, chain head at {}",
                self.name, head.sequence, report.blockchain.head.sequence
            ))),
            None => Ok(Readiness::not_ready(format!(
                "node {}: wallet scan has not started",
                self.name
            ))),
        }
    }

    /// Drive the node's chain forward until `condition` is satisfied by
    /// running companion mining processes against it.
    ///
    /// If the condition already holds, this returns immediately without
    /// launching anything, so repeated calls with a met condition are cheap
    /// no-ops. Companion processes carry the cluster label (and only that
    /// label), and are forcefully removed on every exit path.
    pub async fn mine_until(&self, condition: MineUntil) -> eyre::Result<()> {
        self.mine_until_with(condition, MineOptions::default()).await
    }

    pub async fn mine_until_with(
        &self,
        condition: MineUntil,
        options: MineOptions,
    ) -> eyre::Result<()> {
        let rpc = self.connect_rpc().await?;
        let goal = self.resolve_goal(&rpc, condition).await?;
        if self.goal_met(&rpc, &goal).await? {
            debug!(node = %self.name, ?goal, "mine condition already satisfied");
            return Ok(());
        }

        let mut companions = CompanionReaper::new(Arc::clone(&self.backend));
        let outcome = self.drive_mining(&rpc, &goal, &options, &mut companions).await;
        // Removal runs regardless of how the poll loop exited, so failed
        // waits do not leak miner containers.
        let cleanup = companions.remove_all().await;
        outcome?;
        cleanup
    }

    async fn drive_mining(
        &self,
        rpc: &RpcClient,
        goal: &MineGoal,
        options: &MineOptions,
        companions: &mut CompanionReaper,
    ) -> eyre::Result<()> {
        let image = self.get_image().await?;
        let suffix = companion_suffix();
        let mut miner_args = vec!["miners:start".to_string()];

        if options.pool {
            // The pool is fully launched and named before the miner's
            // argument list is constructed, so the miner always has a
            // listening pool to point at.
            let pool_name = format!("{}-pool-{suffix}", self.container_name);
            self.backend
                .run_detached(&image, &self.companion_run_options(&pool_name, pool_args(&self.name)))
                .await?;
            companions.push(pool_name.clone());
            info!(node = %self.name, pool = %pool_name, "started companion pool");
            miner_args.push("--pool.host".to_string());
            miner_args.push(pool_name);
        } else {
            miner_args.extend(rpc_target_args(&self.name));
        }

        let miner_name = format!("{}-miner-{suffix}", self.container_name);
        self.backend
            .run_detached(&image, &self.companion_run_options(&miner_name, miner_args))
            .await?;
        companions.push(miner_name.clone());
        info!(node = %self.name, miner = %miner_name, ?goal, "mining until condition is met");

        let outcome: eyre::Result<()> = async {
            loop {
                sleep(options.interval).await;
                if self.goal_met(rpc, goal).await? {
                    break Ok(());
                }
            }
        }
        .await;
        outcome
    }

    fn companion_run_options(&self, name: &str, args: Vec<String>) -> RunOptions {
        // Cluster label only: companions must be reaped by teardown but must
        // never be mistaken for a bootstrap node.
        let mut labels = Labels::new();
        labels.insert(CLUSTER_LABEL.to_string(), self.cluster_name.clone());
        RunOptions {
            name: Some(name.to_string()),
            networks: vec![self.cluster_name.clone()],
            labels,
            args,
            ..RunOptions::default()
        }
    }

    async fn resolve_goal(&self, rpc: &RpcClient, condition: MineUntil) -> eyre::Result<MineGoal> {
        Ok(match condition {
            MineUntil::BlockSequence(sequence) => MineGoal::HeadSequence(sequence),
            MineUntil::AdditionalBlocks(count) => {
                let head = rpc.get_status().await?.blockchain.head.sequence;
                MineGoal::HeadSequence(head + count)
            }
            MineUntil::TransactionMined(hash) => MineGoal::TransactionMined(hash),
            MineUntil::AccountBalance(amount) => MineGoal::AccountBalance(amount),
        })
    }

    async fn goal_met(&self, rpc: &RpcClient, goal: &MineGoal) -> eyre::Result<bool> {
        match goal {
            MineGoal::HeadSequence(target) => {
                Ok(rpc.get_status().await?.blockchain.head.sequence >= *target)
            }
            MineGoal::TransactionMined(hash) => match rpc.get_transaction(hash).await {
                Ok(()) => Ok(true),
                // "Not found" is part of the condition semantics: the
                // transaction simply has not been mined yet.
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(e.into()),
            },
            MineGoal::AccountBalance(target) => {
                Ok(rpc.get_account_balance().await?.available_amount()? >= *target)
            }
        }
    }
}

/// Companion container names pending removal. Normal exit paths drain it
/// through [`CompanionReaper::remove_all`]; if the owning future is dropped
/// mid-mine, `Drop` schedules the removal on the runtime instead, so a
/// cancelled wait does not leak miner containers.
struct CompanionReaper {
    backend: Arc<dyn ContainerBackend>,
    names: Vec<String>,
}

impl CompanionReaper {
    fn new(backend: Arc<dyn ContainerBackend>) -> Self {
        Self { backend, names: Vec::new() }
    }

    fn push(&mut self, name: String) {
        self.names.push(name);
    }

    async fn remove_all(&mut self) -> eyre::Result<()> {
        let names = std::mem::take(&mut self.names);
        self.backend.remove(&names, &RemoveOptions { force: true, volumes: false }).await
    }
}

impl Drop for CompanionReaper {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let names = std::mem::take(&mut self.names);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) =
                    backend.remove(&names, &RemoveOptions { force: true, volumes: false }).await
                {
                    warn!(?names, "failed to remove companion containers: {e:#}");
                }
            });
        }
    }
}

fn rpc_target_args(node_name: &str) -> Vec<String> {
    vec![
        "--rpc.tcp".to_string(),
        "--rpc.tcp.host".to_string(),
        node_name.to_string(),
        "--no-rpc.tcp.tls".to_string(),
    ]
}

fn pool_args(node_name: &str) -> Vec<String> {
    let mut args = vec!["miners:pools:start".to_string()];
    args.extend(rpc_target_args(node_name));
    args
}

fn companion_suffix() -> String {
    format!("{:08x}", rand::thread_rng().gen::<u32>())
}
