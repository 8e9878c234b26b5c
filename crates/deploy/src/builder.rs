//! Builder module for creating a [`Deployer`].
//!
//! This module provides the [`DeployerBuilder`] struct which loads the project
//! configuration and fills in the contract and constructor arguments the caller did
//! not give explicitly.

use std::path::PathBuf;

use crate::{BadgerConfig, ConstructorArg, DEFAULT_DEPLOYER, DeployError, Deployer};

/// Builder for creating a [`Deployer`].
///
/// # Example
///
/// ```no_run
/// use badger_deploy::DeployerBuilder;
///
/// # async fn example() -> Result<(), badger_deploy::DeployError> {
/// let deployer = DeployerBuilder::new("goerli")
///     .config_path("badger.toml")
///     .contract("Badge")
///     .build()?;
///
/// let outcome = deployer.deploy(Default::default()).await?;
/// println!("{}", outcome.address);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DeployerBuilder {
    /// The target network (required).
    network: String,
    /// Path to the configuration file or its directory.
    config_path: Option<PathBuf>,
    /// An already loaded configuration, takes precedence over `config_path`.
    config: Option<BadgerConfig>,
    /// The contract identifier (optional when only one contract is configured).
    contract: Option<String>,
    /// The named account signing the deployment.
    deployer: Option<String>,
    /// Constructor arguments (optional, taken from the configuration otherwise).
    args: Option<Vec<ConstructorArg>>,
    redeploy: bool,
}

impl DeployerBuilder {
    /// Create a new [`DeployerBuilder`] targeting `network`.
    pub fn new(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            config_path: None,
            config: None,
            contract: None,
            deployer: None,
            args: None,
            redeploy: false,
        }
    }

    /// Load the configuration from this file or directory.
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Use an explicit configuration instead of loading one.
    pub fn config(mut self, config: BadgerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the contract to deploy.
    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    /// Set the named account that signs the deployment. Defaults to `deployer`.
    pub fn deployer(mut self, deployer: impl Into<String>) -> Self {
        self.deployer = Some(deployer.into());
        self
    }

    /// Set the constructor arguments, overriding the configured ones.
    pub fn args(mut self, args: Vec<ConstructorArg>) -> Self {
        self.args = Some(args);
        self
    }

    /// Deploy even if an identical deployment is already recorded.
    pub fn redeploy(mut self, redeploy: bool) -> Self {
        self.redeploy = redeploy;
        self
    }

    /// Build the [`Deployer`].
    ///
    /// This method:
    /// 1. Loads the configuration unless one was given
    /// 2. Picks the only configured contract if none was given
    /// 3. Takes the constructor arguments from the configuration if none were given
    pub fn build(self) -> Result<Deployer, DeployError> {
        let config = match self.config {
            Some(config) => config,
            None => BadgerConfig::load(self.config_path.as_deref())?,
        };

        let contract = match self.contract {
            Some(contract) => contract,
            None => {
                let mut names = config.contracts.keys();
                match (names.next(), names.next()) {
                    (Some(name), None) => name.clone(),
                    _ => {
                        return Err(DeployError::configuration(
                            "no contract given and the configuration does not name exactly one",
                        ));
                    }
                }
            }
        };

        let args = self
            .args
            .unwrap_or_else(|| config.contract_args(&contract));

        tracing::debug!(
            network = %self.network,
            contract = %contract,
            args = args.len(),
            redeploy = self.redeploy,
            "Building deployer..."
        );

        Ok(Deployer {
            config,
            network: self.network,
            contract,
            deployer: self
                .deployer
                .unwrap_or_else(|| DEFAULT_DEPLOYER.to_string()),
            args,
            redeploy: self.redeploy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_from_config() {
        let deployer = DeployerBuilder::new("goerli")
            .config(BadgerConfig::default())
            .build()
            .expect("built");

        assert_eq!(deployer.network, "goerli");
        assert_eq!(deployer.contract, "Badge");
        assert_eq!(deployer.deployer, DEFAULT_DEPLOYER);
        assert_eq!(deployer.args.len(), 3);
        assert!(!deployer.redeploy);
    }

    #[test]
    fn test_builder_with_options() {
        let deployer = DeployerBuilder::new("testnet")
            .config(BadgerConfig::default())
            .contract("Counter")
            .deployer("admin")
            .args(vec![ConstructorArg::Integer(1)])
            .redeploy(true)
            .build()
            .expect("built");

        assert_eq!(deployer.contract, "Counter");
        assert_eq!(deployer.deployer, "admin");
        assert_eq!(deployer.args, vec![ConstructorArg::Integer(1)]);
        assert!(deployer.redeploy);
    }

    #[test]
    fn test_builder_requires_contract_when_ambiguous() {
        let mut config = BadgerConfig::default();
        config
            .contracts
            .insert("Token".to_string(), Default::default());

        let result = DeployerBuilder::new("goerli").config(config).build();
        assert!(matches!(result, Err(DeployError::Configuration(_))));
    }
}
