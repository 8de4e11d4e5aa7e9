//! Store configuration.
//!
//! Backend connection details are explicit construction inputs, never read
//! from ambient process state. Hosts typically embed this in their own
//! config file and hand the parsed struct to [`StateStore::open`].
//!
//! [`StateStore::open`]: crate::StateStore::open

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use strato_table::{MemoryBackend, RedbBackend, TableBackend, TableResult};

use crate::error::StateResult;
use crate::store::validate_namespace;

/// Configuration for one namespace's state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Namespace identity; partition keys derive from it.
    pub namespace: String,
    /// Which backend to connect.
    pub backend: BackendConfig,
}

/// Backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Ephemeral in-memory backend (testing, local development).
    Memory,
    /// Embedded redb database at the given path.
    Redb { path: PathBuf },
}

impl StoreConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> StateResult<()> {
        validate_namespace(&self.namespace)
    }
}

impl BackendConfig {
    /// Connect the configured backend.
    pub fn connect(&self) -> TableResult<Arc<dyn TableBackend>> {
        match self {
            BackendConfig::Memory => Ok(Arc::new(MemoryBackend::new())),
            BackendConfig::Redb { path } => Ok(Arc::new(RedbBackend::open(path)?)),
        }
    }
}
