use clap::Parser;
use color_eyre::eyre::Result;
use tracing::info;

use fishtank::{BootstrapMode, BootstrapOptions, Cluster, InitOptions};

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct StartCmd {
    /// Name of the cluster to create.
    cluster: String,
    /// Create the network only, without a bootstrap node.
    #[clap(long)]
    no_bootstrap: bool,
    /// Image for the bootstrap node (defaults to the engine's image).
    #[clap(long)]
    image: Option<String>,
}

impl StartCmd {
    pub async fn run(&self) -> Result<()> {
        let cluster = Cluster::new(&self.cluster)?;

        let bootstrap = if self.no_bootstrap {
            BootstrapMode::Disabled
        } else {
            BootstrapMode::Custom(BootstrapOptions {
                node_image: self.image.clone(),
                ..BootstrapOptions::default()
            })
        };
        cluster.init(InitOptions { bootstrap }).await?;

        info!(cluster = %self.cluster, "cluster is up");
        Ok(())
    }
}
