//! Deployment record stores.

mod file;

use std::{collections::BTreeMap, sync::Mutex};

pub use file::FileRecordStore;

use crate::{DeployError, DeploymentRecord, RecordKey};

/// Persistence of deployment records by (contract, network).
///
/// `put` supersedes whatever record was current for the key.
pub trait RecordStore: Send + Sync {
    fn get(&self, key: &RecordKey) -> Result<Option<DeploymentRecord>, DeployError>;

    fn put(&self, record: &DeploymentRecord) -> Result<(), DeployError>;

    /// All current records of a network, ordered by contract.
    fn list(&self, network: &str) -> Result<Vec<DeploymentRecord>, DeployError>;
}

/// Records held in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<BTreeMap<RecordKey, DeploymentRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<RecordKey, DeploymentRecord>>, DeployError>
    {
        self.records
            .lock()
            .map_err(|_| DeployError::Store(anyhow::anyhow!("record store lock poisoned")))
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, key: &RecordKey) -> Result<Option<DeploymentRecord>, DeployError> {
        Ok(self.records()?.get(key).cloned())
    }

    fn put(&self, record: &DeploymentRecord) -> Result<(), DeployError> {
        self.records()?.insert(record.key(), record.clone());
        Ok(())
    }

    fn list(&self, network: &str) -> Result<Vec<DeploymentRecord>, DeployError> {
        Ok(self
            .records()?
            .values()
            .filter(|record| record.network == network)
            .cloned()
            .collect())
    }
}
