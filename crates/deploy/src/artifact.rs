//! Compiled contract artifacts.
//!
//! Both Hardhat (`artifacts/contracts/<File>.sol/<Name>.json`, `bytecode` as a hex
//! string) and Foundry (`out/<File>.sol/<Name>.json`, `bytecode.object`) layouts are
//! understood. Nothing beyond the ABI and the creation bytecode is read.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{B256, Bytes, keccak256},
};
use anyhow::Context;
use serde::Deserialize;

use crate::DeployError;

/// The bytecode and interface of a compiled contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractArtifact {
    /// Contract identifier.
    pub name: String,
    pub abi: JsonAbi,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
}

#[derive(Deserialize)]
struct RawArtifact {
    abi: JsonAbi,
    bytecode: RawBytecode,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    Hex(String),
    Object { object: String },
}

impl ContractArtifact {
    /// Parse an artifact JSON document.
    pub fn from_json(name: &str, content: &str) -> anyhow::Result<Self> {
        let raw: RawArtifact =
            serde_json::from_str(content).context("Failed to parse artifact JSON")?;

        let hex = match raw.bytecode {
            RawBytecode::Hex(hex) => hex,
            RawBytecode::Object { object } => object,
        };

        if hex.contains("__") {
            anyhow::bail!("Bytecode of {name} contains unlinked library placeholders");
        }

        let bytecode = Bytes::from_str(&hex).context("Failed to decode artifact bytecode")?;

        Ok(Self {
            name: name.to_string(),
            abi: raw.abi,
            bytecode,
        })
    }

    /// Keccak-256 hash of the creation bytecode.
    pub fn bytecode_hash(&self) -> B256 {
        keccak256(&self.bytecode)
    }

    /// Interfaces and abstract contracts compile to empty bytecode.
    pub fn is_deployable(&self) -> bool {
        !self.bytecode.is_empty()
    }
}

/// Source of compiled artifacts by contract identifier.
pub trait ArtifactSource {
    fn load(&self, contract: &str) -> Result<ContractArtifact, DeployError>;
}

impl ArtifactSource for BTreeMap<String, ContractArtifact> {
    fn load(&self, contract: &str) -> Result<ContractArtifact, DeployError> {
        self.get(contract)
            .cloned()
            .ok_or_else(|| DeployError::configuration(format!("unknown contract '{contract}'")))
    }
}

/// Artifacts produced by a compiler into a directory tree.
#[derive(Debug, Clone)]
pub struct ArtifactsDir {
    root: PathBuf,
}

impl ArtifactsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the artifact file of a contract.
    ///
    /// `contract` is either a bare name (`Badge`) searched anywhere under the root, or
    /// a fully qualified name (`contracts/Badge.sol:Badge`) resolved directly.
    pub fn locate(&self, contract: &str) -> Result<PathBuf, DeployError> {
        if let Some((source, name)) = contract.split_once(':') {
            let path = self.root.join(source).join(format!("{name}.json"));
            if path.is_file() {
                return Ok(path);
            }
            return Err(DeployError::configuration(format!(
                "artifact for {contract} not found at {}",
                path.display()
            )));
        }

        let file_name = format!("{contract}.json");
        let mut matches = Vec::new();
        find_files(&self.root, &file_name, &mut matches).map_err(|e| {
            DeployError::configuration(format!(
                "failed to scan artifacts directory {}: {e:#}",
                self.root.display()
            ))
        })?;

        match matches.len() {
            0 => Err(DeployError::configuration(format!(
                "no artifact named {contract} under {}; compile the contracts first",
                self.root.display()
            ))),
            1 => Ok(matches.remove(0)),
            _ => Err(DeployError::configuration(format!(
                "several artifacts are named {contract}, use a fully qualified name: {}",
                matches
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

impl ArtifactSource for ArtifactsDir {
    fn load(&self, contract: &str) -> Result<ContractArtifact, DeployError> {
        let path = self.locate(contract)?;
        tracing::debug!(contract, path = %path.display(), "Loading artifact");

        let name = contract
            .rsplit_once(':')
            .map(|(_, name)| name)
            .unwrap_or(contract);

        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|content| ContractArtifact::from_json(name, &content))
            .map_err(|e| DeployError::configuration(format!("invalid artifact for {contract}: {e:#}")))
    }
}

/// Collect files named `file_name` below `dir`, skipping compiler build info.
fn find_files(dir: &Path, file_name: &str, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            if entry.file_name() != "build-info" {
                find_files(&path, file_name, out)?;
            }
        } else if entry.file_name() == file_name {
            out.push(path);
        }
    }

    Ok(())
}
