use std::path::PathBuf;

use badger_deploy::{ConstructorArg, DEFAULT_DEPLOYER};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "badger")]
#[command(
    author,
    version,
    about = "Deploy smart contracts exactly once per network"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(
        short,
        long,
        global = true,
        env = "BADGER_VERBOSITY",
        default_value_t = LevelFilter::INFO
    )]
    pub verbosity: LevelFilter,

    /// Path to the badger.toml configuration file, or the directory holding it.
    ///
    /// If not provided, only built-in defaults and BADGER_* environment variables are used.
    #[arg(long, alias = "conf", global = true, env = "BADGER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a contract, unless an identical deployment is already recorded.
    ///
    /// Prints the contract address on stdout.
    Deploy {
        /// The target network, as named in the configuration.
        #[arg(short, long, env = "BADGER_NETWORK")]
        network: String,

        /// The contract to deploy.
        ///
        /// If not provided, the only contract listed in the configuration is used.
        #[arg(short, long)]
        contract: Option<String>,

        /// A constructor argument. Repeat in constructor order.
        ///
        /// If none are provided, the arguments configured for the contract are used.
        #[arg(short, long = "arg", value_name = "VALUE")]
        args: Vec<ConstructorArg>,

        /// The named account signing the deployment.
        #[arg(long, default_value = DEFAULT_DEPLOYER)]
        deployer: String,

        /// Deploy even if an identical deployment is already recorded.
        #[arg(long, env = "BADGER_REDEPLOY", default_value_t = false)]
        redeploy: bool,
    },

    /// List recorded deployments.
    Deployments {
        /// Only list deployments of this network.
        #[arg(short, long)]
        network: Option<String>,
    },

    /// List configured networks.
    Networks,

    /// Write a default badger.toml.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}
