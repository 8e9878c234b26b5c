//! The network as seen by the executor.

use std::future::Future;

use alloy_core::primitives::{Address, B256, Bytes};

use crate::DeployerAccount;

/// Receipt of a mined contract-creation transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationReceipt {
    pub transaction_hash: B256,
    /// Set by the node for successful creations.
    pub contract_address: Option<Address>,
    pub block_number: u64,
    pub success: bool,
}

/// Operations the executor needs from a network endpoint.
///
/// Errors are returned as-is and classified by the caller, which knows the step it
/// was performing.
pub trait ChainClient: Send + Sync {
    /// The chain id reported by the endpoint.
    fn chain_id(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// The runtime code at `address`; empty if nothing is deployed there.
    fn code_at(&self, address: Address) -> impl Future<Output = anyhow::Result<Bytes>> + Send;

    /// Sign and broadcast a contract-creation transaction, returning its hash.
    fn submit_creation(
        &self,
        deployer: &DeployerAccount,
        chain_id: u64,
        creation_code: &Bytes,
    ) -> impl Future<Output = anyhow::Result<B256>> + Send;

    /// The receipt of `transaction_hash`, or `None` while it is pending.
    fn receipt(
        &self,
        transaction_hash: B256,
    ) -> impl Future<Output = anyhow::Result<Option<CreationReceipt>>> + Send;

    /// The latest block number.
    fn block_number(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;
}
