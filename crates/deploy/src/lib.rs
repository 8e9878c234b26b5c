//! badger-deploy - Idempotent smart-contract deployment.
//!
//! This crate plans contract deployments from a project configuration and compiled
//! artifacts, submits the creation transaction, waits for confirmation and records
//! the deployed address so an identical request is never deployed twice.
//!
//! The network is reached through [`ChainClient`] and deployments are persisted
//! through [`RecordStore`], so both can be swapped in tests.

pub mod args;
mod artifact;
mod builder;
mod chain;
mod config;
mod deployer;
mod error;
mod executor;
mod planner;
mod record;
pub mod rpc;
mod store;

pub use args::{ConstructorArg, TypedArgs};
pub use artifact::{ArtifactSource, ArtifactsDir, ContractArtifact};
pub use builder::DeployerBuilder;
pub use chain::{ChainClient, CreationReceipt};
pub use config::{
    BadgerConfig, CONFIG_FILENAME, ConfirmationConfig, ContractConfig, DEFAULT_DEPLOYER,
    ENV_PREFIX, NamedAccount, NetworkConfig,
};
pub use deployer::Deployer;
pub use error::{DeployError, DeploymentStep};
pub use executor::{ConfirmationPolicy, DeploymentOutcome, Executor};
pub use planner::{DeployerAccount, DeploymentRequest, NetworkProfile, Planner};
pub use record::{DeploymentRecord, RecordKey};
pub use rpc::JsonRpcClient;
pub use store::{FileRecordStore, InMemoryRecordStore, RecordStore};
