//! Project configuration: networks, named accounts, artifact and record locations.
//!
//! Configuration is layered with figment: built-in defaults, then `badger.toml`,
//! then `BADGER_*` environment variables (nested keys are split on `__`, so
//! `BADGER_NETWORKS__GOERLI__URL` overrides `networks.goerli.url`). String values
//! of network urls and accounts may reference environment variables as `${NAME}`;
//! they are expanded once at load time so the rest of the crate only ever sees an
//! explicit [`BadgerConfig`].

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{ConfirmationPolicy, ConstructorArg, DeployError};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "badger.toml";

/// Prefix of the environment variables merged over the configuration file.
pub const ENV_PREFIX: &str = "BADGER_";

/// Named account used as the deployer when none is given.
pub const DEFAULT_DEPLOYER: &str = "deployer";

/// Connection settings of one target network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub url: String,
    /// Chain id the endpoint must report.
    pub chain_id: u64,
    /// Hex-encoded private keys available for signing, in order.
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Overrides [`ConfirmationConfig::confirmations`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    /// Overrides [`ConfirmationConfig::timeout_secs`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Overrides [`ConfirmationConfig::poll_interval_ms`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
}

/// A named account: an index into the network's `accounts`, or a literal address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NamedAccount {
    Index(usize),
    Address(Address),
}

/// Per-contract defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Constructor arguments used when none are given on the command line.
    #[serde(default)]
    pub args: Vec<ConstructorArg>,
}

/// How long and how often to wait for a creation receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Number of blocks, including the inclusion block, before a receipt counts.
    pub confirmations: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 500,
            poll_interval_ms: 2_000,
            confirmations: 1,
        }
    }
}

/// Complete configuration of a deployment project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgerConfig {
    /// Known networks by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Named accounts by role.
    #[serde(default)]
    pub named_accounts: BTreeMap<String, NamedAccount>,
    /// Directory holding compiled contract artifacts.
    pub artifacts: PathBuf,
    /// Directory holding deployment records.
    pub deployments: PathBuf,
    /// Per-contract defaults by contract identifier.
    #[serde(default)]
    pub contracts: BTreeMap<String, ContractConfig>,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

impl Default for BadgerConfig {
    fn default() -> Self {
        let goerli = NetworkConfig {
            url: "${GOERLI_URL}".to_string(),
            chain_id: 5,
            accounts: vec!["${PRIVATE_KEY}".to_string()],
            confirmations: None,
            timeout_secs: None,
            poll_interval_ms: None,
        };

        let badge = ContractConfig {
            args: vec![
                ConstructorArg::Text("0x28CeE427fCD58e5EF1cE4C93F877b621E2Db66df".to_string()),
                ConstructorArg::Integer(5),
                ConstructorArg::Text(
                    "0x51ea83562bdc7cdc587c6376a68642520256257a9d1a52d17c09131a3aeff8e9"
                        .to_string(),
                ),
            ],
        };

        Self {
            networks: BTreeMap::from([("goerli".to_string(), goerli)]),
            named_accounts: BTreeMap::from([(DEFAULT_DEPLOYER.to_string(), NamedAccount::Index(0))]),
            artifacts: PathBuf::from("artifacts"),
            deployments: PathBuf::from("deployments"),
            contracts: BTreeMap::from([("Badge".to_string(), badge)]),
            confirmation: ConfirmationConfig::default(),
        }
    }
}

impl BadgerConfig {
    /// Load the configuration from defaults, an optional TOML file and the environment.
    ///
    /// `path` may point at a directory, in which case [`CONFIG_FILENAME`] inside it
    /// is used.
    pub fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(DeployError::configuration(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }

            let config_path = if path.is_dir() {
                path.join(CONFIG_FILENAME)
            } else {
                path.to_path_buf()
            };
            figment = figment.merge(Toml::file(config_path));
        }

        let mut config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| DeployError::configuration(format!("invalid configuration: {e}")))?;

        config.expand_env(|name| std::env::var(name).ok());

        tracing::debug!(
            networks = config.networks.len(),
            artifacts = %config.artifacts.display(),
            deployments = %config.deployments.display(),
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse a configuration from TOML text merged over the defaults.
    ///
    /// Environment variables are neither merged nor expanded.
    pub fn from_toml(content: &str) -> Result<Self, DeployError> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| DeployError::configuration(format!("invalid configuration: {e}")))
    }

    /// Expand `${NAME}` references in network urls and accounts.
    ///
    /// A url referencing an unset variable becomes empty. An account referencing an
    /// unset variable is dropped, so a missing `PRIVATE_KEY` leaves the network
    /// without accounts rather than with a bogus one.
    pub fn expand_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for network in self.networks.values_mut() {
            network.url = expand(&network.url, &lookup).unwrap_or_default();
            network.accounts = network
                .accounts
                .iter()
                .filter_map(|account| expand(account, &lookup))
                .collect();
        }
    }

    /// The confirmation policy for a network, with per-network overrides applied.
    pub fn confirmation_policy(&self, network: &str) -> ConfirmationPolicy {
        let defaults = self.confirmation;
        let network = self.networks.get(network);

        let timeout_secs = network
            .and_then(|n| n.timeout_secs)
            .unwrap_or(defaults.timeout_secs);
        let poll_interval_ms = network
            .and_then(|n| n.poll_interval_ms)
            .unwrap_or(defaults.poll_interval_ms);
        let confirmations = network
            .and_then(|n| n.confirmations)
            .unwrap_or(defaults.confirmations);

        ConfirmationPolicy {
            timeout: Duration::from_secs(timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
            confirmations,
        }
    }

    /// Write the configuration to `path` as TOML.
    ///
    /// Values are written as held, so `${NAME}` references survive only on a
    /// configuration that was not loaded through [`BadgerConfig::load`].
    pub fn save_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Default constructor arguments of a contract.
    pub fn contract_args(&self, contract: &str) -> Vec<ConstructorArg> {
        self.contracts
            .get(contract)
            .map(|c| c.args.clone())
            .unwrap_or_default()
    }
}

/// Substitute every `${NAME}` in `value`. Returns `None` if a variable is unset or empty.
fn expand(value: &str, lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };

        out.push_str(&rest[..start]);
        let resolved = lookup(&after[..end]).filter(|v| !v.is_empty())?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Some(out)
}
