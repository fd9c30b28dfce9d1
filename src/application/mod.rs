//! Application layer: growth orchestration
//!
//! This layer drives the domain model through a run and owns run-level
//! failure handling.

pub mod budget;
pub mod error;
pub mod generator;
pub mod generator_data;

pub use budget::{ResourceBudget, StopReason};
pub use error::{ApplicationError, ApplicationResult};
pub use generator::{
    FailureKind, GeneratorState, GrowthReport, StageSettings, StepOutcome, TreeGenerator,
};
pub use generator_data::{
    CandidateStrategy, DLimMonitor, GeneratorData, ProgressCounters, ProgressSnapshot,
};
