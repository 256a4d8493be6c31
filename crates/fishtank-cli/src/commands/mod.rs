pub mod mine_until;
pub mod spawn;
pub mod start;
pub mod stop;

use clap::Subcommand;
use mine_until::MineUntilCmd;
use spawn::SpawnCmd;
use start::StartCmd;
use stop::StopCmd;

#[derive(Subcommand)]
pub enum Commands {
    /// Create a cluster and bootstrap its first node.
    Start(StartCmd),
    /// Spawn an additional node into a cluster.
    #[command(arg_required_else_help = true)]
    Spawn(SpawnCmd),
    /// Mine on a node until a chain condition is met.
    #[command(name = "mineuntil", arg_required_else_help = true)]
    MineUntil(MineUntilCmd),
    /// Tear down a cluster and everything it created.
    Stop(StopCmd),
}
