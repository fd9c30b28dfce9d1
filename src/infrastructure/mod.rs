//! Infrastructure layer: persistence of grown trees
//!
//! This layer implements the I/O boundary traits the CLI wires up.

pub mod error;
pub mod snapshot;

pub use error::{InfraError, InfraResult};
pub use snapshot::{read_snapshot, SnapshotSummary, SnapshotWriter, TomlSnapshotWriter, TreeSnapshot};
