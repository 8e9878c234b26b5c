//! Deployment runs wired to the project configuration.
//!
//! A [`Deployer`] loads the artifact, plans the request, and hands it to an
//! [`Executor`] backed by the file record store and the network's JSON-RPC endpoint.

use tokio_util::sync::CancellationToken;

use crate::{
    ArtifactSource, ArtifactsDir, BadgerConfig, ConstructorArg, DeployError, DeploymentOutcome,
    DeploymentRequest, Executor, FileRecordStore, JsonRpcClient, NetworkProfile, Planner,
};

/// One deployment run: which contract, with which arguments, to which network.
///
/// Built with [`crate::DeployerBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployer {
    pub config: BadgerConfig,
    /// Target network name.
    pub network: String,
    /// Contract identifier.
    pub contract: String,
    /// Named account signing the creation.
    pub deployer: String,
    pub args: Vec<ConstructorArg>,
    /// Deploy even if an identical deployment is recorded.
    pub redeploy: bool,
}

impl Deployer {
    /// Resolve the network and build the creation request against `artifacts`.
    ///
    /// Does not touch the network.
    pub fn plan(
        &self,
        artifacts: &impl ArtifactSource,
    ) -> Result<(NetworkProfile, DeploymentRequest), DeployError> {
        let planner = Planner::new(&self.config);
        let profile = planner.plan(&self.network, &self.deployer)?;
        let artifact = artifacts.load(&self.contract)?;
        let request = planner.request(&artifact, &self.args, &profile)?;
        Ok((profile, request))
    }

    /// Deploy the contract using the configured artifacts directory, record store and
    /// the network's JSON-RPC endpoint.
    pub async fn deploy(&self, cancel: CancellationToken) -> Result<DeploymentOutcome, DeployError> {
        tracing::info!(
            network = %self.network,
            contract = %self.contract,
            "Starting deployment process..."
        );

        let (profile, request) = self.plan(&ArtifactsDir::new(&self.config.artifacts))?;

        let store = FileRecordStore::new(&self.config.deployments);
        let client =
            JsonRpcClient::new(profile.rpc_url.clone()).map_err(DeployError::submission)?;

        Executor::new(&client, &store)
            .with_policy(self.config.confirmation_policy(&self.network))
            .with_cancellation(cancel)
            .force(self.redeploy)
            .ensure_deployed(&request, &profile)
            .await
    }
}
