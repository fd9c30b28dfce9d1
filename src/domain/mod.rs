//! Domain layer: vascular tree model, growth rules and scoring
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod constraint;
pub mod cost;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod hydraulics;
pub mod space;
pub mod spatial;
pub mod stats;
pub mod tree;
pub mod trial;
pub mod vessel;

pub use arena::{VesselArena, VesselIndex, VesselNode};
pub use constraint::{ConstraintFunction, HydraulicLaws, ViscosityModel};
pub use cost::{CandidateMetrics, CostEstimator, PowerTerm};
pub use error::{DomainError, DomainResult, GeometryViolation};
pub use filter::{BranchingModeFilter, CompositeFilter, FilterPolicy, StageFilter, VesselFilter};
pub use geometry::{BoundingBox, Point};
pub use space::{
    CompositeDistribution, Cuboid, DistributionGenerator, Domain, DomainObserver, Region, Shape,
    SimpleDomain, Sphere, Stage, StageTransition, StagedDomain,
};
pub use stats::{StatManipulator, TreeStatsManager, VesselAttribute};
pub use tree::{Commit, ConnectivityRecord, TreeParameters, VascularTree, VesselRecord};
pub use trial::{
    CandidateEvaluation, Junction, Rejections, ScoredTrial, TrialEvaluator, TrialHydraulics, TrialLimits,
    TrialPlan,
};
pub use vessel::{BranchingMode, TerminalType, Vessel, VesselFunction, VesselId, VesselOptions};
