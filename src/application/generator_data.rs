//! Generator parameters, progress counters and acceptance-distance monitor

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::{
    BranchingMode, CostEstimator, DomainError, DomainResult, TrialLimits, VesselFunction,
    VesselOptions,
};

/// How attachment candidates are found and terminals accepted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateStrategy {
    /// Acceptance distance dLim decaying with the terminal count
    #[default]
    NearestSegments,
    /// Each terminal claims an exclusive ball of `radius`
    FixedPerfusionRadius { radius: f64 },
}

/// Per-stage growth parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorData {
    /// Samples drawn per iteration before the terminal is dropped
    pub n_terminal_trial: usize,
    /// Factor applied to the dLim correction when sampling fails
    pub d_lim_reduction_factor: f64,
    pub perfusion_area_factor: f64,
    /// Candidate search radius in units of dLim
    pub close_neighborhood_factor: f64,
    /// Partitions of the junction search grid
    pub n_bifurcation_test: usize,
    pub d_lim_correction_factor: f64,
    pub candidate_count: usize,
    pub vessel_function: VesselFunction,
    pub branching_mode: BranchingMode,
    /// Restart the dLim correction from `d_lim_correction_factor` when this
    /// stage begins
    pub resets_d_lim: bool,
    pub min_terminal_distance: f64,
    pub failure_rate_threshold: f64,
    pub min_iterations_for_failure: usize,
    pub root_attempts: usize,
    pub min_radius: f64,
    pub max_root_pressure: Option<f64>,
    pub cost_estimator: CostEstimator,
    pub strategy: CandidateStrategy,
}

impl Default for GeneratorData {
    fn default() -> Self {
        Self {
            n_terminal_trial: 500,
            d_lim_reduction_factor: 0.9,
            perfusion_area_factor: 0.5,
            close_neighborhood_factor: 4.0,
            n_bifurcation_test: 7,
            d_lim_correction_factor: 1.0,
            candidate_count: 20,
            vessel_function: VesselFunction::Distribution,
            branching_mode: BranchingMode::DeformableParent,
            resets_d_lim: false,
            min_terminal_distance: 0.0,
            failure_rate_threshold: 0.9,
            min_iterations_for_failure: 50,
            root_attempts: 10_000,
            min_radius: 0.0,
            max_root_pressure: None,
            cost_estimator: CostEstimator::Volumetric,
            strategy: CandidateStrategy::NearestSegments,
        }
    }
}

impl GeneratorData {
    pub fn validate(&self) -> DomainResult<()> {
        if self.n_terminal_trial == 0 {
            return Err(DomainError::parameter("n_terminal_trial", "must be at least 1"));
        }
        if !(self.d_lim_reduction_factor > 0.0 && self.d_lim_reduction_factor < 1.0) {
            return Err(DomainError::parameter("d_lim_reduction_factor", "must be in (0, 1)"));
        }
        if !(self.perfusion_area_factor > 0.0) {
            return Err(DomainError::parameter("perfusion_area_factor", "must be positive"));
        }
        if !(self.d_lim_correction_factor > 0.0) {
            return Err(DomainError::parameter("d_lim_correction_factor", "must be positive"));
        }
        if self.candidate_count == 0 {
            return Err(DomainError::parameter("candidate_count", "must be at least 1"));
        }
        if self.n_bifurcation_test < 2 {
            return Err(DomainError::parameter("n_bifurcation_test", "must be at least 2"));
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold < 1.0) {
            return Err(DomainError::parameter("failure_rate_threshold", "must be in (0, 1)"));
        }
        if !(self.min_terminal_distance >= 0.0) {
            return Err(DomainError::parameter("min_terminal_distance", "must not be negative"));
        }
        if let CandidateStrategy::FixedPerfusionRadius { radius } = self.strategy {
            if !(radius > 0.0 && radius.is_finite()) {
                return Err(DomainError::parameter("radius", "perfusion radius must be positive"));
            }
        }
        self.cost_estimator.validate()
    }

    pub fn trial_limits(&self) -> TrialLimits {
        TrialLimits {
            bifurcation_tests: self.n_bifurcation_test,
            min_radius: self.min_radius,
            max_root_pressure: self.max_root_pressure,
        }
    }

    /// Attributes of vessels grown under these parameters.
    pub fn vessel_options(&self) -> VesselOptions {
        VesselOptions::default()
            .with_branching_mode(self.branching_mode)
            .with_function(self.vessel_function)
    }
}

/// Progress counters shared with monitoring collaborators.
///
/// Written by the generator only; readers never block it.
#[derive(Debug, Default)]
pub struct ProgressCounters {
    pub target: AtomicUsize,
    pub produced: AtomicUsize,
    pub iterations: AtomicUsize,
    pub stage: AtomicUsize,
    pub sampling_failures: AtomicUsize,
    pub no_candidate_failures: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub rejected_topology: AtomicUsize,
    pub rejected_geometry: AtomicUsize,
    pub rejected_hydraulic: AtomicUsize,
}

impl ProgressCounters {
    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            target: self.target.load(Ordering::Relaxed),
            produced: self.produced.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
            stage: self.stage.load(Ordering::Relaxed),
            sampling_failures: self.sampling_failures.load(Ordering::Relaxed),
            no_candidate_failures: self.no_candidate_failures.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            rejected_topology: self.rejected_topology.load(Ordering::Relaxed),
            rejected_geometry: self.rejected_geometry.load(Ordering::Relaxed),
            rejected_hydraulic: self.rejected_hydraulic.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ProgressSnapshot {
    pub target: usize,
    pub produced: usize,
    pub iterations: usize,
    pub stage: usize,
    pub sampling_failures: usize,
    pub no_candidate_failures: usize,
    pub rollbacks: usize,
    pub rejected_topology: usize,
    pub rejected_geometry: usize,
    pub rejected_hydraulic: usize,
}

impl ProgressSnapshot {
    /// Iterations that ended without a commit.
    pub fn failures(&self) -> usize {
        self.sampling_failures + self.no_candidate_failures + self.rollbacks
    }

    pub fn failure_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.failures() as f64 / self.iterations as f64
        }
    }
}

const MONITOR_WINDOW: usize = 5;

/// Tracks the dLim actually used relative to its nominal value.
///
/// Once the window of recent ratios is full, the largest one becomes the
/// new correction factor.
#[derive(Debug, Clone, Default)]
pub struct DLimMonitor {
    window: VecDeque<f64>,
}

impl DLimMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ratio: f64) -> Option<f64> {
        if self.window.len() == MONITOR_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(ratio);
        (self.window.len() == MONITOR_WINDOW)
            .then(|| self.window.iter().copied().fold(f64::MIN, f64::max))
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
