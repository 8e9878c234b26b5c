//! Deployment records.

use alloy_core::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Records are keyed by contract identifier and network name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{contract}@{network}")]
pub struct RecordKey {
    pub contract: String,
    pub network: String,
}

impl RecordKey {
    pub fn new(contract: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            network: network.into(),
        }
    }
}

/// A confirmed on-chain deployment.
///
/// A record is only ever written after its creation transaction was confirmed, and is
/// never modified afterwards; a later deployment of the same key supersedes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub contract: String,
    pub network: String,
    pub chain_id: u64,
    pub address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
    pub deployer: Address,
    /// Keccak-256 of the creation bytecode, without constructor arguments.
    pub bytecode_hash: B256,
    /// Canonical constructor arguments.
    pub args: Vec<String>,
    pub deployed_at: DateTime<Utc>,
    /// Version of the tool that wrote the record.
    #[serde(default)]
    pub tool_version: String,
}

impl DeploymentRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.contract, &self.network)
    }
}
