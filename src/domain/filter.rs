//! Read-only vessel selection

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::arena::VesselIndex;
use crate::domain::tree::VascularTree;
use crate::domain::vessel::{BranchingMode, Vessel};

pub trait VesselFilter: Send + Sync + fmt::Debug {
    fn matches(&self, vessel: &Vessel) -> bool;

    /// Matching vessels of `tree` in pre-order.
    fn apply<'t>(&self, tree: &'t VascularTree) -> Vec<(VesselIndex, &'t Vessel)> {
        tree.vessels().filter(|(_, v)| self.matches(v)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchingModeFilter(pub BranchingMode);

impl VesselFilter for BranchingModeFilter {
    fn matches(&self, vessel: &Vessel) -> bool {
        vessel.branching_mode == self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFilter(pub i32);

impl VesselFilter for StageFilter {
    fn matches(&self, vessel: &Vessel) -> bool {
        vessel.stage == self.0
    }
}

/// How a composite combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPolicy {
    /// Every child must match (AND)
    All,
    /// At least one child must match (OR)
    Any,
}

#[derive(Debug)]
pub struct CompositeFilter {
    policy: FilterPolicy,
    filters: Vec<Box<dyn VesselFilter>>,
}

impl CompositeFilter {
    pub fn new(policy: FilterPolicy) -> Self {
        Self {
            policy,
            filters: Vec::new(),
        }
    }

    pub fn all() -> Self {
        Self::new(FilterPolicy::All)
    }

    pub fn any() -> Self {
        Self::new(FilterPolicy::Any)
    }

    pub fn with(mut self, filter: impl VesselFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn policy(&self) -> FilterPolicy {
        self.policy
    }
}

impl VesselFilter for CompositeFilter {
    // An empty AND matches everything, an empty OR nothing.
    fn matches(&self, vessel: &Vessel) -> bool {
        match self.policy {
            FilterPolicy::All => self.filters.iter().all(|f| f.matches(vessel)),
            FilterPolicy::Any => self.filters.iter().any(|f| f.matches(vessel)),
        }
    }
}
