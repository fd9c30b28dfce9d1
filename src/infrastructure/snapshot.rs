//! Tree snapshots and their TOML persistence

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{ConnectivityRecord, VascularTree, VesselRecord};
use crate::infrastructure::error::{InfraError, InfraResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub vessels: usize,
    pub terminals: usize,
    pub volume: f64,
    pub stage: i32,
}

/// Serializable view of a tree: geometry records plus connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub summary: SnapshotSummary,
    pub vessels: Vec<VesselRecord>,
    pub connectivity: Vec<ConnectivityRecord>,
}

impl TreeSnapshot {
    pub fn capture(tree: &VascularTree) -> Self {
        Self {
            summary: SnapshotSummary {
                vessels: tree.len(),
                terminals: tree.terminal_count(),
                volume: tree.volume(),
                stage: tree.current_stage(),
            },
            vessels: tree.vessel_data(),
            connectivity: tree.vessel_connectivity(),
        }
    }
}

/// Persistence boundary for grown trees.
pub trait SnapshotWriter: Send + Sync {
    fn write(&self, snapshot: &TreeSnapshot) -> InfraResult<()>;
}

/// Writes snapshots as TOML, creating parent directories as needed.
#[derive(Debug, Clone)]
pub struct TomlSnapshotWriter {
    path: PathBuf,
}

impl TomlSnapshotWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotWriter for TomlSnapshotWriter {
    #[instrument(level = "debug", skip(self, snapshot), fields(path = %self.path.display()))]
    fn write(&self, snapshot: &TreeSnapshot) -> InfraResult<()> {
        let content = toml::to_string_pretty(snapshot).map_err(|e| InfraError::serialize(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| InfraError::io(format!("create directory {}", parent.display()), e))?;
        }
        fs::write(&self.path, content)
            .map_err(|e| InfraError::io(format!("write {}", self.path.display()), e))?;
        debug!("write: vessels={}", snapshot.vessels.len());
        Ok(())
    }
}

/// Reads a snapshot written by [`TomlSnapshotWriter`].
pub fn read_snapshot(path: &Path) -> InfraResult<TreeSnapshot> {
    let content =
        fs::read_to_string(path).map_err(|e| InfraError::io(format!("read {}", path.display()), e))?;
    toml::from_str(&content).map_err(|e| InfraError::serialize(format!("parse {}: {e}", path.display())))
}
