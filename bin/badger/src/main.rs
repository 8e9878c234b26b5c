//! badger is a CLI tool to deploy smart contracts idempotently across networks.

mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use badger_deploy::{
    BadgerConfig, CONFIG_FILENAME, ConstructorArg, DeployerBuilder, FileRecordStore, RecordStore,
};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger. Stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Deploy {
            network,
            contract,
            args,
            deployer,
            redeploy,
        } => {
            deploy(
                cli.config.as_deref(),
                network,
                contract,
                args,
                deployer,
                redeploy,
            )
            .await
        }
        Commands::Deployments { network } => deployments(cli.config.as_deref(), network),
        Commands::Networks => networks(cli.config.as_deref()),
        Commands::Init { force } => init(cli.config, force),
    }
}

async fn deploy(
    config_path: Option<&Path>,
    network: String,
    contract: Option<String>,
    args: Vec<ConstructorArg>,
    deployer: String,
    redeploy: bool,
) -> Result<()> {
    let mut builder = DeployerBuilder::new(network)
        .deployer(deployer)
        .redeploy(redeploy);

    if let Some(config_path) = config_path {
        builder = builder.config_path(config_path);
    }

    if let Some(contract) = contract {
        builder = builder.contract(contract);
    }

    // Arguments given on the command line replace the configured ones.
    if !args.is_empty() {
        builder = builder.args(args);
    }

    let deployer = builder.build()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling deployment...");
            on_interrupt.cancel();
        }
    });

    let outcome = deployer.deploy(cancel).await.with_context(|| {
        format!(
            "Failed to deploy {} to {}",
            deployer.contract, deployer.network
        )
    })?;

    println!("{}", outcome.address);

    Ok(())
}

fn deployments(config_path: Option<&Path>, network: Option<String>) -> Result<()> {
    let config = BadgerConfig::load(config_path)?;
    let store = FileRecordStore::new(&config.deployments);

    let networks = match network {
        Some(network) => vec![network],
        None => config.networks.keys().cloned().collect(),
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "Contract",
        "Network",
        "Chain",
        "Address",
        "Transaction",
        "Block",
        "Deployed at",
    ]);

    for network in &networks {
        for record in store.list(network)? {
            table.add_row(vec![
                record.contract,
                record.network,
                record.chain_id.to_string(),
                record.address.to_string(),
                record.transaction_hash.to_string(),
                record.block_number.to_string(),
                record.deployed_at.to_rfc3339(),
            ]);
        }
    }

    println!("{table}");

    Ok(())
}

fn networks(config_path: Option<&Path>) -> Result<()> {
    let config = BadgerConfig::load(config_path)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Network", "Chain", "Endpoint", "Accounts"]);

    for (name, network) in &config.networks {
        table.add_row(vec![
            name.clone(),
            network.chain_id.to_string(),
            endpoint_host(&network.url),
            network.accounts.len().to_string(),
        ]);
    }

    println!("{table}");

    Ok(())
}

/// Scheme and host of an RPC url. Paths often carry API keys and are not shown.
fn endpoint_host(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(url) => format!(
            "{}://{}",
            url.scheme(),
            url.host_str().unwrap_or_default()
        ),
        Err(_) if url.is_empty() => "<unset>".to_string(),
        Err(_) => "<invalid>".to_string(),
    }
}

fn init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(path) if path.is_dir() => path.join(CONFIG_FILENAME),
        Some(path) => path,
        None => PathBuf::from(CONFIG_FILENAME),
    };

    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists, pass --force to overwrite it",
            path.display()
        );
    }

    BadgerConfig::default().save_to_file(&path)?;
    println!("{}", path.display());

    Ok(())
}
