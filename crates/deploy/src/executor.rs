//! Deployment execution: idempotency check, submission, confirmation and recording.

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256};
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::{
    ChainClient, CreationReceipt, DeployError, DeploymentRecord, DeploymentRequest,
    NetworkProfile, RecordStore,
};

/// How the executor waits for a creation transaction to be confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// Deadline for the whole wait, measured from submission.
    pub timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Number of blocks, including the inclusion block, before a receipt counts.
    pub confirmations: u64,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(500),
            poll_interval: Duration::from_secs(2),
            confirmations: 1,
        }
    }
}

/// The result of [`Executor::ensure_deployed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentOutcome {
    pub address: Address,
    pub transaction_hash: B256,
    /// True when an existing deployment was returned and nothing was submitted.
    pub reused: bool,
}

/// Ensures a contract is deployed on a network, at most once per identical request.
pub struct Executor<'a, C, S> {
    client: &'a C,
    store: &'a S,
    policy: ConfirmationPolicy,
    cancel: CancellationToken,
    force: bool,
}

impl<'a, C, S> Executor<'a, C, S>
where
    C: ChainClient,
    S: RecordStore,
{
    pub fn new(client: &'a C, store: &'a S) -> Self {
        Self {
            client,
            store,
            policy: ConfirmationPolicy::default(),
            cancel: CancellationToken::new(),
            force: false,
        }
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort the run when `cancel` fires. Before the broadcast nothing is sent;
    /// after it the confirmation wait stops.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Deploy even if a matching record exists.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Make sure `request` is deployed on `profile`'s network and return its address.
    ///
    /// A record matching the request (same bytecode and arguments, code still present
    /// on-chain) is reused without submitting anything. Otherwise a creation
    /// transaction is submitted, confirmed, and recorded. Nothing is recorded if any
    /// step fails.
    pub async fn ensure_deployed(
        &self,
        request: &DeploymentRequest,
        profile: &NetworkProfile,
    ) -> Result<DeploymentOutcome, DeployError> {
        let key = request.key(&profile.name);

        if !self.force {
            if let Some(record) = self.store.get(&key)? {
                if let Some(outcome) = self
                    .unless_cancelled(self.reuse(&record, request, profile))
                    .await?
                {
                    return Ok(outcome);
                }
            }
        }

        self.unless_cancelled(self.check_chain_id(profile)).await?;

        tracing::info!(
            contract = %request.contract,
            network = %profile.name,
            deployer = %profile.deployer.address(),
            args = ?request.snapshot,
            "Submitting contract creation..."
        );

        let transaction_hash = self
            .unless_cancelled(async {
                self.client
                    .submit_creation(&profile.deployer, profile.chain_id, &request.creation_code)
                    .await
                    .map_err(DeployError::submission)
            })
            .await?;

        tracing::info!(tx_hash = %transaction_hash, "Waiting for confirmation...");

        let receipt = self.await_confirmation(transaction_hash).await?;
        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::confirmation(anyhow::anyhow!(
                "receipt of {transaction_hash} carries no contract address"
            ))
        })?;

        let record = DeploymentRecord {
            contract: request.contract.clone(),
            network: profile.name.clone(),
            chain_id: profile.chain_id,
            address,
            transaction_hash,
            block_number: receipt.block_number,
            deployer: request.deployer,
            bytecode_hash: request.bytecode_hash,
            args: request.snapshot.clone(),
            deployed_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        self.store.put(&record)?;

        tracing::info!(
            contract = %request.contract,
            network = %profile.name,
            address = %address,
            tx_hash = %transaction_hash,
            block = receipt.block_number,
            "Contract deployed"
        );

        Ok(DeploymentOutcome {
            address,
            transaction_hash,
            reused: false,
        })
    }

    /// Decide whether `record` can stand in for a fresh deployment of `request`.
    async fn reuse(
        &self,
        record: &DeploymentRecord,
        request: &DeploymentRequest,
        profile: &NetworkProfile,
    ) -> Result<Option<DeploymentOutcome>, DeployError> {
        if record.chain_id != profile.chain_id || !request.matches(record) {
            tracing::info!(
                contract = %request.contract,
                network = %profile.name,
                previous = %record.address,
                "Bytecode or constructor arguments changed, redeploying"
            );
            return Ok(None);
        }

        let code = self
            .client
            .code_at(record.address)
            .await
            .map_err(DeployError::preflight)?;

        if code.is_empty() {
            tracing::warn!(
                contract = %request.contract,
                network = %profile.name,
                address = %record.address,
                "Recorded deployment has no code on-chain, redeploying"
            );
            return Ok(None);
        }

        tracing::info!(
            contract = %request.contract,
            network = %profile.name,
            address = %record.address,
            "Reusing existing deployment"
        );

        Ok(Some(DeploymentOutcome {
            address: record.address,
            transaction_hash: record.transaction_hash,
            reused: true,
        }))
    }

    async fn check_chain_id(&self, profile: &NetworkProfile) -> Result<(), DeployError> {
        let reported = self
            .client
            .chain_id()
            .await
            .map_err(DeployError::preflight)?;

        if reported != profile.chain_id {
            return Err(DeployError::configuration(format!(
                "network '{}' is configured with chain id {} but {} reports chain id {}",
                profile.name, profile.chain_id, profile.rpc_url, reported
            )));
        }

        Ok(())
    }

    /// Run a step up to and including the broadcast, giving up as soon as the run is
    /// cancelled. A token cancelled before the step starts means nothing is sent.
    async fn unless_cancelled<T>(
        &self,
        step: impl Future<Output = Result<T, DeployError>>,
    ) -> Result<T, DeployError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled { transaction_hash: None }),
            result = step => result,
        }
    }

    /// Wait for `transaction_hash` to be confirmed, bounded by the policy deadline and
    /// the cancellation token.
    async fn await_confirmation(
        &self,
        transaction_hash: B256,
    ) -> Result<CreationReceipt, DeployError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DeployError::Cancelled {
                transaction_hash: Some(transaction_hash),
            }),
            result = tokio::time::timeout(self.policy.timeout, self.poll_receipt(transaction_hash)) => {
                match result {
                    Ok(result) => result,
                    Err(_) => Err(DeployError::Timeout {
                        transaction_hash,
                        timeout: self.policy.timeout,
                    }),
                }
            }
        }
    }

    /// Poll until the receipt exists and is deep enough. Never returns on its own if
    /// the transaction stays pending.
    async fn poll_receipt(&self, transaction_hash: B256) -> Result<CreationReceipt, DeployError> {
        loop {
            match self
                .client
                .receipt(transaction_hash)
                .await
                .map_err(DeployError::confirmation)?
            {
                Some(receipt) if !receipt.success => {
                    return Err(DeployError::confirmation(anyhow::anyhow!(
                        "contract creation {transaction_hash} reverted in block {}",
                        receipt.block_number
                    )));
                }
                Some(receipt) if self.policy.confirmations <= 1 => return Ok(receipt),
                Some(receipt) => {
                    let head = self
                        .client
                        .block_number()
                        .await
                        .map_err(DeployError::confirmation)?;
                    let depth = head.saturating_sub(receipt.block_number) + 1;

                    if depth >= self.policy.confirmations {
                        return Ok(receipt);
                    }

                    tracing::trace!(
                        tx_hash = %transaction_hash,
                        depth,
                        required = self.policy.confirmations,
                        "Waiting for more confirmations"
                    );
                }
                None => {
                    tracing::trace!(tx_hash = %transaction_hash, "Transaction pending");
                }
            }

            tokio::time::sleep(self.policy.poll_interval).await;
        }
    }
}
