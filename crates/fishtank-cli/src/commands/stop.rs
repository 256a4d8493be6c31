use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use fishtank::Cluster;

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct StopCmd {
    /// Name of the cluster to tear down.
    cluster: String,
}

impl StopCmd {
    pub async fn run(&self) -> Result<()> {
        let cluster = Cluster::new(&self.cluster)?;
        cluster.teardown().await?;

        info!(cluster = %self.cluster, "cluster removed");
        Ok(())
    }
}
