//! Ledger configuration.
//!
//! Mirrors the shape of a typical runtime config struct: plain data,
//! `Default`, `serde(Deserialize)` so it can be loaded from a config file or
//! environment via the `config` crate, and no behavior of its own.

use std::path::{Path, PathBuf};

use ledger_log::FsyncPolicy;
use serde::{Deserialize, Serialize};

/// Which embedded key-value engine backs the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StorageBackend {
    /// Non-persistent, in-process storage. Useful for tests and ephemeral
    /// instances; event bodies do not survive a restart (the log still
    /// does, so a cold rebuild still recovers them).
    #[default]
    Memory,
    /// Durable storage on the `sled` embedded database.
    Sled,
}

impl StorageBackend {
    /// Directory name suffix used under the data directory, e.g.
    /// `event_store_sled`.
    pub fn engine_name(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Sled => "sled",
        }
    }
}

/// Configuration for a [`crate::CausalLedger`] instance.
///
/// The core is initialized from `(log_file_path, initial_graph_capacity)`
/// plus a handful of operational knobs. The data directory is always the
/// parent of `log_file_path` (or the current directory if that path has no
/// parent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path to the append-only event log.
    pub log_file_path: PathBuf,
    /// Initial DAG adjacency capacity; doubles on demand.
    pub initial_graph_capacity: usize,
    /// This process's node id, used to stamp vector clocks.
    pub local_node_id: String,
    /// Directory holding the six index snapshot files. Defaults to the data
    /// directory when `None`.
    pub index_dir: Option<PathBuf>,
    /// How aggressively the event log fsyncs.
    pub fsync_policy: FsyncPolicy,
    /// Which embedded engine backs the event store.
    pub storage_backend: StorageBackend,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            log_file_path: PathBuf::from("events.log"),
            initial_graph_capacity: 16,
            local_node_id: "default-node".to_string(),
            index_dir: None,
            fsync_policy: FsyncPolicy::Never,
            storage_backend: StorageBackend::Memory,
        }
    }
}

impl LedgerConfig {
    /// A config pointing at `log_file_path` with every other field
    /// defaulted.
    pub fn new(log_file_path: impl Into<PathBuf>, initial_graph_capacity: usize) -> Self {
        Self {
            log_file_path: log_file_path.into(),
            initial_graph_capacity,
            ..Self::default()
        }
    }

    /// The data directory: `log_file_path`'s parent, or `.` if it has none.
    pub fn data_dir(&self) -> PathBuf {
        match self.log_file_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Directory the six index files live in.
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir.clone().unwrap_or_else(|| self.data_dir())
    }

    /// Directory owned by the embedded key-value engine.
    pub fn event_store_dir(&self) -> PathBuf {
        self.data_dir()
            .join(format!("event_store_{}", self.storage_backend.engine_name()))
    }

    /// Builder-style override of the local node id.
    pub fn with_local_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.local_node_id = node_id.into();
        self
    }

    /// Builder-style override of the storage backend.
    pub fn with_storage_backend(mut self, backend: StorageBackend) -> Self {
        self.storage_backend = backend;
        self
    }

    /// Builder-style override of the fsync policy.
    pub fn with_fsync_policy(mut self, policy: FsyncPolicy) -> Self {
        self.fsync_policy = policy;
        self
    }

    /// Builder-style override of the index directory.
    pub fn with_index_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.index_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}
