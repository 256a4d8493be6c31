use clap::{ArgGroup, Parser};
use color_eyre::eyre::{eyre, Result};
use tracing::info;

use fishtank::{Cluster, MineOptions, MineUntil, DEFAULT_BOOTSTRAP_NODE_NAME};

#[derive(Parser, Debug, Clone, PartialEq)]
#[clap(group(
    ArgGroup::new("condition")
        .required(true)
        .args(["sequence", "additional", "transaction", "balance"])
))]
pub struct MineUntilCmd {
    /// Name of an existing cluster.
    cluster: String,
    /// Node to mine against.
    #[clap(long, default_value = DEFAULT_BOOTSTRAP_NODE_NAME)]
    node: String,
    /// Mine until the chain head reaches this sequence.
    #[clap(long)]
    sequence: Option<u64>,
    /// Mine this many blocks past the current head.
    #[clap(long)]
    additional: Option<u64>,
    /// Mine until this transaction hash lands on a block.
    #[clap(long)]
    transaction: Option<String>,
    /// Mine until the available wallet balance reaches this amount (in ore).
    #[clap(long)]
    balance: Option<u128>,
    /// Mine through a companion pool process.
    #[clap(long)]
    pool: bool,
}

impl MineUntilCmd {
    pub async fn run(&self) -> Result<()> {
        let cluster = Cluster::new(&self.cluster)?;
        let node = cluster
            .get_node(&self.node)
            .await?
            .ok_or_else(|| eyre!("no node named {:?} in cluster {:?}", self.node, self.cluster))?;

        let condition = self.condition();
        node.mine_until_with(
            condition.clone(),
            MineOptions { pool: self.pool, ..MineOptions::default() },
        )
        .await?;

        info!(node = %node.name(), ?condition, "mining condition met");
        Ok(())
    }

    fn condition(&self) -> MineUntil {
        // clap's argument group guarantees exactly one of these is set.
        if let Some(sequence) = self.sequence {
            MineUntil::BlockSequence(sequence)
        } else if let Some(additional) = self.additional {
            MineUntil::AdditionalBlocks(additional)
        } else if let Some(transaction) = &self.transaction {
            MineUntil::TransactionMined(transaction.clone())
        } else if let Some(balance) = self.balance {
            MineUntil::AccountBalance(balance)
        } else {
            unreachable!("clap enforces the condition argument group")
        }
    }
}
