//! File-backed record store.
//!
//! Layout, one directory per network:
//!
//! ```text
//! deployments/
//!   goerli/
//!     .chainId
//!     .lock
//!     Badge.json
//! ```
//!
//! Writers of a network directory are serialised through an exclusive lock on `.lock`
//! and records are replaced by renaming a fully written temporary file, so a reader
//! never observes a partial record and the last writer wins.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use anyhow::Context;
use fs2::FileExt;

use super::RecordStore;
use crate::{DeployError, DeploymentRecord, RecordKey};

const CHAIN_ID_FILENAME: &str = ".chainId";
const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone)]
pub struct FileRecordStore {
    root: PathBuf,
}

impl FileRecordStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn network_dir(&self, network: &str) -> PathBuf {
        self.root.join(network)
    }

    pub fn record_path(&self, key: &RecordKey) -> PathBuf {
        self.network_dir(&key.network)
            .join(format!("{}.json", file_stem(&key.contract)))
    }

    /// Chain id recorded for a network directory, if any.
    pub fn chain_id(&self, network: &str) -> Result<Option<u64>, DeployError> {
        let path = self.network_dir(network).join(CHAIN_ID_FILENAME);
        if !path.exists() {
            return Ok(None);
        }

        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))
            .and_then(|content| {
                content
                    .trim()
                    .parse()
                    .with_context(|| format!("Malformed chain id in {}", path.display()))
            })
            .map(Some)
            .map_err(DeployError::Store)
    }

    fn write_record(&self, record: &DeploymentRecord) -> anyhow::Result<()> {
        let dir = self.network_dir(&record.network);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(dir.join(LOCK_FILENAME))
            .context("Failed to open record store lock file")?;
        lock.lock_exclusive()
            .context("Failed to lock record store")?;

        let result = self.write_locked(&dir, record);

        if let Err(e) = FileExt::unlock(&lock) {
            tracing::warn!(err = %e, dir = %dir.display(), "Failed to unlock record store");
        }

        result
    }

    fn write_locked(&self, dir: &Path, record: &DeploymentRecord) -> anyhow::Result<()> {
        write_atomic(
            &dir.join(CHAIN_ID_FILENAME),
            record.chain_id.to_string().as_bytes(),
        )?;

        let json = serde_json::to_string_pretty(record)
            .context("Failed to serialize deployment record")?;
        let path = self.record_path(&record.key());
        write_atomic(&path, json.as_bytes())?;

        tracing::debug!(path = %path.display(), "Deployment record written");
        Ok(())
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, key: &RecordKey) -> Result<Option<DeploymentRecord>, DeployError> {
        let path = self.record_path(key);
        if !path.exists() {
            return Ok(None);
        }

        read_record(&path).map(Some).map_err(DeployError::Store)
    }

    fn put(&self, record: &DeploymentRecord) -> Result<(), DeployError> {
        self.write_record(record).map_err(DeployError::Store)
    }

    fn list(&self, network: &str) -> Result<Vec<DeploymentRecord>, DeployError> {
        let dir = self.network_dir(network);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut paths = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))
            .map_err(DeployError::Store)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        paths.sort();

        let mut records = paths
            .iter()
            .map(|path| read_record(path))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(DeployError::Store)?;
        records.sort_by(|a, b| a.contract.cmp(&b.contract));

        Ok(records)
    }
}

fn read_record(path: &Path) -> anyhow::Result<DeploymentRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse deployment record {}", path.display()))
}

fn write_atomic(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        std::io::Write::write_all(&mut file, content)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp.display()))?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move record into place at {}", path.display()))
}

/// Fully qualified names (`contracts/Badge.sol:Badge`) are flattened into one file name.
fn file_stem(contract: &str) -> String {
    contract
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect()
}
