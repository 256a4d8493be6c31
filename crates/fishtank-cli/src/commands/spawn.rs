use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use fishtank::{Cluster, SpawnOptions};

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct SpawnCmd {
    /// Name of an existing cluster.
    cluster: String,
    /// Name of the node to spawn.
    #[clap(long)]
    name: String,
    /// Image for the node (defaults to the engine's image).
    #[clap(long)]
    image: Option<String>,
    /// Return immediately instead of waiting for the node to start.
    #[clap(long)]
    no_wait: bool,
}

impl SpawnCmd {
    pub async fn run(&self) -> Result<()> {
        let cluster = Cluster::new(&self.cluster)?;

        let node = cluster
            .spawn(SpawnOptions {
                image: self.image.clone(),
                wait_for_start: !self.no_wait,
                ..SpawnOptions::new(&self.name)
            })
            .await?;

        info!(cluster = %self.cluster, node = %node.name(), "node is up");
        Ok(())
    }
}
