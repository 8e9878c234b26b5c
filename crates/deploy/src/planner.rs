//! Deployment planning: turns configuration and user input into a concrete request.
//!
//! Planning is pure. Nothing here touches the network or the record store, so every
//! error raised by the planner happens before a transaction could be sent.

use std::str::FromStr;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256, Bytes},
};
use alloy_signer_local::PrivateKeySigner;
use url::Url;

use crate::{
    BadgerConfig, ConfirmationPolicy, ConstructorArg, ContractArtifact, DeployError,
    DeploymentRecord, NamedAccount, RecordKey, args::type_constructor_args,
};

/// The account that signs the contract-creation transaction.
#[derive(Debug, Clone)]
pub enum DeployerAccount {
    /// A private key held by this process.
    Local(PrivateKeySigner),
    /// An account unlocked on the node itself (anvil, hardhat node).
    Unlocked(Address),
}

impl DeployerAccount {
    pub fn address(&self) -> Address {
        match self {
            Self::Local(signer) => signer.address(),
            Self::Unlocked(address) => *address,
        }
    }
}

/// Resolved target network for one run.
#[derive(Debug, Clone)]
pub struct NetworkProfile {
    pub name: String,
    pub rpc_url: Url,
    pub chain_id: u64,
    pub deployer: DeployerAccount,
}

/// A fully typed contract-creation request.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    /// Contract identifier.
    pub contract: String,
    /// Constructor arguments, typed against the ABI.
    pub arguments: Vec<DynSolValue>,
    /// Canonical rendering of `arguments`.
    pub snapshot: Vec<String>,
    /// Creation bytecode followed by the ABI-encoded constructor arguments.
    pub creation_code: Bytes,
    /// Keccak-256 of the creation bytecode alone.
    pub bytecode_hash: B256,
    pub deployer: Address,
}

impl DeploymentRequest {
    pub fn key(&self, network: &str) -> RecordKey {
        RecordKey::new(&self.contract, network)
    }

    /// Whether `record` was produced by an identical request.
    pub fn matches(&self, record: &DeploymentRecord) -> bool {
        record.contract == self.contract
            && record.bytecode_hash == self.bytecode_hash
            && record.args == self.snapshot
    }
}

/// Resolves networks, accounts and constructor arguments from an explicit configuration.
#[derive(Debug, Clone, Copy)]
pub struct Planner<'a> {
    config: &'a BadgerConfig,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a BadgerConfig) -> Self {
        Self { config }
    }

    /// Resolve `network` and the named account `deployer` into a [`NetworkProfile`].
    pub fn plan(&self, network: &str, deployer: &str) -> Result<NetworkProfile, DeployError> {
        let Some(network_config) = self.config.networks.get(network) else {
            return Err(DeployError::configuration(format!(
                "unknown network '{network}', configured networks: [{}]",
                self.config
                    .networks
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        };

        if network_config.url.is_empty() {
            return Err(DeployError::configuration(format!(
                "network '{network}' has no RPC url"
            )));
        }

        let rpc_url = Url::parse(&network_config.url).map_err(|e| {
            DeployError::configuration(format!("network '{network}' has an invalid RPC url: {e}"))
        })?;

        let signers = network_config
            .accounts
            .iter()
            .enumerate()
            .map(|(index, key)| {
                // Never echo the key itself.
                PrivateKeySigner::from_str(key).map_err(|_| {
                    DeployError::configuration(format!(
                        "account #{index} of network '{network}' is not a valid private key"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let Some(named) = self.config.named_accounts.get(deployer) else {
            return Err(DeployError::configuration(format!(
                "named account '{deployer}' is not configured"
            )));
        };

        let account = match *named {
            NamedAccount::Index(index) => signers
                .get(index)
                .cloned()
                .map(DeployerAccount::Local)
                .ok_or_else(|| {
                    DeployError::configuration(format!(
                        "named account '{deployer}' refers to account #{index}, but network '{network}' has {} account(s) configured",
                        signers.len()
                    ))
                })?,
            NamedAccount::Address(address) => signers
                .iter()
                .find(|signer| signer.address() == address)
                .cloned()
                .map(DeployerAccount::Local)
                .unwrap_or(DeployerAccount::Unlocked(address)),
        };

        tracing::debug!(
            network,
            chain_id = network_config.chain_id,
            deployer = %account.address(),
            unlocked = matches!(account, DeployerAccount::Unlocked(_)),
            "Network resolved"
        );

        Ok(NetworkProfile {
            name: network.to_string(),
            rpc_url,
            chain_id: network_config.chain_id,
            deployer: account,
        })
    }

    /// Build the creation request of `artifact` with `args`.
    ///
    /// Fails with [`DeployError::ArgumentMismatch`] when the arguments do not fit the
    /// constructor signature.
    pub fn request(
        &self,
        artifact: &ContractArtifact,
        args: &[ConstructorArg],
        profile: &NetworkProfile,
    ) -> Result<DeploymentRequest, DeployError> {
        if !artifact.is_deployable() {
            return Err(DeployError::configuration(format!(
                "{} has no creation bytecode; interfaces and abstract contracts cannot be deployed",
                artifact.name
            )));
        }

        let typed = type_constructor_args(&artifact.name, &artifact.abi, args)?;

        let mut creation_code = artifact.bytecode.to_vec();
        creation_code.extend(typed.abi_encode());

        Ok(DeploymentRequest {
            contract: artifact.name.clone(),
            arguments: typed.values,
            snapshot: typed.snapshot,
            creation_code: creation_code.into(),
            bytecode_hash: artifact.bytecode_hash(),
            deployer: profile.deployer.address(),
        })
    }

    /// How long to wait for confirmations on `network`.
    pub fn confirmation_policy(&self, network: &str) -> ConfirmationPolicy {
        self.config.confirmation_policy(network)
    }
}
