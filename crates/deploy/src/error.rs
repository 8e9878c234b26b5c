//! Error taxonomy of a deployment run.

use std::time::Duration;

use alloy_core::primitives::B256;
use thiserror::Error;

/// The on-chain step a [`DeployError::Deployment`] failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum DeploymentStep {
    /// Querying the endpoint before anything is submitted.
    Preflight,
    /// Preparing and sending the contract-creation transaction.
    Submission,
    /// Waiting for the receipt of the contract-creation transaction.
    Confirmation,
}

/// Errors that terminate a deployment run.
///
/// None of them are retried. A run that returns any of these never writes a
/// deployment record.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Bad or missing network, account or artifact. The input must be fixed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Constructor arguments don't match the contract's constructor signature.
    #[error("constructor arguments for {contract} do not match its signature: {reason}")]
    ArgumentMismatch { contract: String, reason: String },

    /// The network rejected the creation, or the creation reverted.
    #[error("deployment failed during {step}: {source}")]
    Deployment {
        step: DeploymentStep,
        #[source]
        source: anyhow::Error,
    },

    /// No confirmation was observed before the deadline.
    #[error("transaction {transaction_hash} was not confirmed within {timeout:?}")]
    Timeout {
        transaction_hash: B256,
        timeout: Duration,
    },

    /// The run was aborted. `transaction_hash` is set when the creation had already
    /// been broadcast.
    #[error("deployment cancelled{}", cancelled_after(.transaction_hash))]
    Cancelled { transaction_hash: Option<B256> },

    /// The deployment record store could not be read or written.
    #[error("deployment record store failure: {0}")]
    Store(#[source] anyhow::Error),
}

impl DeployError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn argument_mismatch(contract: &str, reason: impl Into<String>) -> Self {
        Self::ArgumentMismatch {
            contract: contract.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn preflight(source: anyhow::Error) -> Self {
        Self::Deployment {
            step: DeploymentStep::Preflight,
            source,
        }
    }

    pub(crate) fn submission(source: anyhow::Error) -> Self {
        Self::Deployment {
            step: DeploymentStep::Submission,
            source,
        }
    }

    pub(crate) fn confirmation(source: anyhow::Error) -> Self {
        Self::Deployment {
            step: DeploymentStep::Confirmation,
            source,
        }
    }
}

fn cancelled_after(transaction_hash: &Option<B256>) -> String {
    match transaction_hash {
        Some(hash) => format!(" while awaiting confirmation of {hash}"),
        None => " before submission".to_string(),
    }
}
