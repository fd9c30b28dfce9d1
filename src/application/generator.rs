//! Staged CCO growth loop
//!
//! Each iteration samples one terminal, scores every candidate parent in
//! parallel against the frozen tree, and commits the single best placement.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info, instrument, trace, warn};

use crate::application::budget::{ResourceBudget, StopReason};
use crate::application::error::{ApplicationError, ApplicationResult};
use crate::application::generator_data::{
    CandidateStrategy, DLimMonitor, GeneratorData, ProgressCounters, ProgressSnapshot,
};
use crate::domain::{
    BranchingMode, Commit, Domain, DomainError, DomainObserver, DomainResult, HydraulicLaws,
    Junction, Point, Rejections, ScoredTrial, StageTransition, StagedDomain, TreeParameters,
    TrialEvaluator, VascularTree, Vessel, VesselFunction, VesselIndex,
};

/// Minimum clearance between a sampled terminal and the tree.
const MIN_TREE_CLEARANCE: f64 = 1e-9;

/// Growth parameters and hydraulic laws of one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSettings {
    pub data: GeneratorData,
    pub laws: HydraulicLaws,
}

impl StageSettings {
    pub fn new(data: GeneratorData, laws: HydraulicLaws) -> Self {
        Self { data, laws }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    Init,
    Sampling,
    CandidateEval,
    Commit,
    StageAdvance,
    Done,
    Stopped,
    Failed,
}

impl GeneratorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GeneratorState::Done | GeneratorState::Stopped | GeneratorState::Failed)
    }
}

/// Why an iteration ended without a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Sampling,
    NoCandidate,
    Rollback,
}

/// Result of a single `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    RootPlaced,
    Committed { terminals: usize },
    Dropped(FailureKind),
    StageAdvanced { stage: usize },
    Stopped(StopReason),
    Finished,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct GrowthReport {
    pub state: GeneratorState,
    pub terminals: usize,
    pub produced: usize,
    pub stage: usize,
    pub volume: f64,
    pub progress: ProgressSnapshot,
    pub stop: Option<StopReason>,
    pub elapsed: Duration,
}

/// Observer the generator registers on its own domain; the transition is
/// applied at the top of the next iteration.
#[derive(Debug, Default)]
struct StageListener {
    pending: Mutex<Option<StageTransition>>,
}

impl StageListener {
    fn take(&self) -> Option<StageTransition> {
        self.pending.lock().take()
    }
}

impl DomainObserver for StageListener {
    fn stage_changed(&self, transition: &StageTransition) {
        *self.pending.lock() = Some(*transition);
    }
}

/// Grows a vascular tree inside a staged domain.
pub struct TreeGenerator {
    tree: VascularTree,
    domain: StagedDomain,
    stages: Vec<StageSettings>,
    data: GeneratorData,
    listener: Arc<StageListener>,
    counters: Arc<ProgressCounters>,
    monitor: DLimMonitor,
    d_lim_correction: f64,
    rng: StdRng,
    budget: ResourceBudget,
    state: GeneratorState,
    /// Terminal count when the run started
    base: usize,
    started: Option<Instant>,
    stop: Option<StopReason>,
}

impl TreeGenerator {
    /// Generator for a new tree rooted at `params.perfusion_point`.
    ///
    /// `stages[i]` configures domain stage `i`; the last entry covers any
    /// stage beyond the list.
    pub fn new(
        params: TreeParameters,
        domain: StagedDomain,
        stages: Vec<StageSettings>,
        seed: u64,
    ) -> ApplicationResult<Self> {
        let first = stages
            .first()
            .ok_or_else(|| DomainError::parameter("stages", "at least one stage setting is required"))?;
        let tree = VascularTree::new(params, first.laws.clone())?;
        Self::with_tree(tree, domain, stages, seed)
    }

    /// Resumes growth on an existing tree; stage targets count terminals
    /// added on top of the ones already present.
    pub fn with_tree(
        mut tree: VascularTree,
        mut domain: StagedDomain,
        stages: Vec<StageSettings>,
        seed: u64,
    ) -> ApplicationResult<Self> {
        let first = stages
            .first()
            .cloned()
            .ok_or_else(|| DomainError::parameter("stages", "at least one stage setting is required"))?;
        for settings in &stages {
            settings.data.validate()?;
        }
        tree.set_laws(first.laws);
        tree.set_current_stage(0);
        tree.update_pressure();

        let listener = Arc::new(StageListener::default());
        domain.register_observer(listener.clone());

        let base = tree.terminal_count();
        let counters = Arc::new(ProgressCounters::default());
        counters
            .target
            .store(domain.total_target(), Ordering::Relaxed);
        debug!(
            "TreeGenerator: stages={} target={} base={} seed={}",
            domain.stage_count(),
            domain.total_target(),
            base,
            seed
        );

        Ok(Self {
            tree,
            domain,
            d_lim_correction: first.data.d_lim_correction_factor,
            data: first.data,
            stages,
            listener,
            counters,
            monitor: DLimMonitor::new(),
            rng: StdRng::seed_from_u64(seed),
            budget: ResourceBudget::unlimited(),
            state: GeneratorState::Init,
            base,
            started: None,
            stop: None,
        })
    }

    pub fn with_budget(mut self, budget: ResourceBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Registers an additional stage observer; it is notified after the
    /// generator's own listener.
    pub fn register_observer(&mut self, observer: Arc<dyn DomainObserver>) {
        self.domain.register_observer(observer);
    }

    pub fn state(&self) -> GeneratorState {
        self.state
    }

    pub fn tree(&self) -> &VascularTree {
        &self.tree
    }

    pub fn into_tree(self) -> VascularTree {
        self.tree
    }

    pub fn domain(&self) -> &StagedDomain {
        &self.domain
    }

    /// Shared counters, readable while the generator runs.
    pub fn progress(&self) -> Arc<ProgressCounters> {
        Arc::clone(&self.counters)
    }

    pub fn current_data(&self) -> &GeneratorData {
        &self.data
    }

    pub fn d_lim_correction(&self) -> f64 {
        self.d_lim_correction
    }

    /// Terminals added by this run.
    pub fn produced(&self) -> usize {
        self.tree.terminal_count().saturating_sub(self.base)
    }

    fn stage_target(&self) -> usize {
        self.domain.cumulative_target(self.domain.current_stage())
    }

    fn settings_for(&self, stage: usize) -> Option<&StageSettings> {
        self.stages.get(stage).or_else(|| self.stages.last())
    }

    /// Runs until every stage is complete, the budget is spent or the
    /// failure rate escalates.
    #[instrument(level = "debug", skip(self))]
    pub fn generate(&mut self) -> ApplicationResult<GrowthReport> {
        loop {
            match self.step()? {
                StepOutcome::Finished | StepOutcome::Stopped(_) => break,
                _ => {}
            }
        }
        let report = self.report();
        info!(
            "generate: state={:?} terminals={} volume={:.6e} iterations={}",
            report.state, report.terminals, report.volume, report.progress.iterations
        );
        Ok(report)
    }

    pub fn report(&self) -> GrowthReport {
        GrowthReport {
            state: self.state,
            terminals: self.tree.terminal_count(),
            produced: self.produced(),
            stage: self.domain.current_stage(),
            volume: self.tree.volume(),
            progress: self.counters.snapshot(),
            stop: self.stop,
            elapsed: self.started.map_or(Duration::ZERO, |s| s.elapsed()),
        }
    }

    /// Advances the growth state machine by one transition.
    pub fn step(&mut self) -> ApplicationResult<StepOutcome> {
        if self.state.is_terminal() {
            return Ok(StepOutcome::Finished);
        }
        let started = *self.started.get_or_insert_with(Instant::now);

        if self.state == GeneratorState::Init {
            self.state = GeneratorState::Sampling;
            if self.tree.is_empty() && self.domain.total_target() > 0 {
                self.place_root()?;
                self.sync_produced();
                return Ok(StepOutcome::RootPlaced);
            }
        }

        self.apply_pending_transition();

        if self.produced() >= self.stage_target() {
            if self.domain.is_last_stage() {
                info!("step: done terminals={}", self.tree.terminal_count());
                self.state = GeneratorState::Done;
                return Ok(StepOutcome::Finished);
            }
            self.state = GeneratorState::StageAdvance;
            self.domain.advance_stage();
            self.apply_pending_transition();
            self.state = GeneratorState::Sampling;
            return Ok(StepOutcome::StageAdvanced {
                stage: self.domain.current_stage(),
            });
        }

        // A met target wins over a budget exhausted by the same iteration
        let iterations = self.counters.iterations.load(Ordering::Relaxed);
        if let Some(reason) = self.budget.check(iterations, started.elapsed()) {
            info!("step: stopping, {}", reason);
            self.state = GeneratorState::Stopped;
            self.stop = Some(reason);
            return Ok(StepOutcome::Stopped(reason));
        }

        ProgressCounters::bump(&self.counters.iterations);
        self.iterate()
    }

    fn iterate(&mut self) -> ApplicationResult<StepOutcome> {
        self.state = GeneratorState::Sampling;
        let (point, d_lim) = match self.sample_terminal() {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                self.shrink_d_lim();
                return self.record_failure(FailureKind::Sampling);
            }
            Err(err) => {
                debug!("iterate: sampling failed: {}", err);
                return self.record_failure(FailureKind::Sampling);
            }
        };

        self.state = GeneratorState::CandidateEval;
        let candidates = self.candidates(&point, d_lim);
        let Some(best) = self.evaluate(&point, &candidates) else {
            trace!("iterate: no admissible placement for {}", point);
            return self.record_failure(FailureKind::NoCandidate);
        };

        self.state = GeneratorState::Commit;
        match self.commit(&best) {
            Ok(()) => {
                self.state = GeneratorState::Sampling;
                self.sync_produced();
                if let CandidateStrategy::NearestSegments = self.data.strategy {
                    if let Some(correction) = self.monitor.record(self.d_lim_correction) {
                        self.d_lim_correction = correction;
                    }
                }
                Ok(StepOutcome::Committed {
                    terminals: self.tree.terminal_count(),
                })
            }
            Err(err) if err.is_recoverable() => {
                warn!("iterate: commit rolled back: {}", err);
                self.state = GeneratorState::Sampling;
                self.record_failure(FailureKind::Rollback)
            }
            Err(err) => {
                self.state = GeneratorState::Failed;
                Err(err.into())
            }
        }
    }

    // ------------------------------------------------------------------
    // Stage handling
    // ------------------------------------------------------------------

    fn apply_pending_transition(&mut self) {
        let Some(transition) = self.listener.take() else {
            return;
        };
        let Some(settings) = self.settings_for(transition.current).cloned() else {
            return;
        };
        if settings.data.resets_d_lim {
            self.d_lim_correction = settings.data.d_lim_correction_factor;
        }
        self.data = settings.data;
        self.monitor.reset();
        self.tree.set_laws(settings.laws);
        self.tree.set_current_stage(transition.current as i32);
        self.tree.update_pressure();
        self.counters
            .stage
            .store(transition.current, Ordering::Relaxed);
        info!(
            "apply_pending_transition: stage={} target={} d_lim_correction={:.4}",
            transition.current, transition.cumulative_target, self.d_lim_correction
        );
    }

    // ------------------------------------------------------------------
    // Sampling
    // ------------------------------------------------------------------

    #[instrument(level = "trace", skip(self))]
    fn place_root(&mut self) -> ApplicationResult<()> {
        let perfusion = self.tree.params().perfusion_point;
        let mut d_lim = self.domain.d_lim(1, self.data.perfusion_area_factor) * self.d_lim_correction;
        for attempt in 0..self.data.root_attempts {
            if attempt > 0 && attempt % self.data.n_terminal_trial == 0 {
                d_lim *= self.data.d_lim_reduction_factor;
            }
            let p = match self.domain.random_point(&mut self.rng) {
                Ok(p) => p,
                Err(err) => return Err(self.run_failure(format!("root placement: {err}"))),
            };
            let reachable = self.data.vessel_function == VesselFunction::Perforator
                || self.domain.is_segment_inside(&perfusion, &p);
            if perfusion.distance(&p) >= d_lim && reachable {
                self.tree.set_root(p, &self.data.vessel_options())?;
                info!("place_root: distal={} attempts={} d_lim={:.4}", p, attempt + 1, d_lim);
                return Ok(());
            }
        }
        Err(self.run_failure(format!(
            "no admissible root position after {} attempts",
            self.data.root_attempts
        )))
    }

    /// Draws a terminal position; `None` when every trial was too close to
    /// the tree.
    fn sample_terminal(&mut self) -> DomainResult<Option<(Point, f64)>> {
        let d_lim = match self.data.strategy {
            CandidateStrategy::NearestSegments => {
                self.domain
                    .d_lim(self.tree.terminal_count(), self.data.perfusion_area_factor)
                    * self.d_lim_correction
            }
            CandidateStrategy::FixedPerfusionRadius { radius } => radius,
        };
        for _ in 0..self.data.n_terminal_trial {
            let p = self.domain.random_point(&mut self.rng)?;
            if self.accepts(&p, d_lim) {
                return Ok(Some((p, d_lim)));
            }
        }
        debug!("sample_terminal: no point beyond d_lim={:.4}", d_lim);
        Ok(None)
    }

    fn accepts(&self, p: &Point, d_lim: f64) -> bool {
        let clearance = self.tree.distance_to_tree(p);
        let spaced = self.data.min_terminal_distance <= 0.0
            || self
                .domain
                .local_neighborhood(p, self.data.min_terminal_distance, &self.tree)
                .is_empty();
        let claimed = match self.data.strategy {
            CandidateStrategy::NearestSegments => clearance >= d_lim,
            CandidateStrategy::FixedPerfusionRadius { radius } => {
                clearance > MIN_TREE_CLEARANCE && self.tree.terminals_within(p, 2.0 * radius).is_empty()
            }
        };
        claimed && spaced
    }

    fn shrink_d_lim(&mut self) {
        if let CandidateStrategy::NearestSegments = self.data.strategy {
            self.d_lim_correction *= self.data.d_lim_reduction_factor;
            debug!("shrink_d_lim: correction={:.4}", self.d_lim_correction);
        }
    }

    // ------------------------------------------------------------------
    // Candidate evaluation
    // ------------------------------------------------------------------

    /// Whether `vessel` may receive the new branch. Distal attachment to a
    /// terminal would not add a terminal, so such vessels are skipped.
    fn admissible(&self, idx: VesselIndex, vessel: &Vessel) -> bool {
        vessel.branching_mode.accepts_branches()
            && self.domain.is_valid_element(vessel)
            && !(vessel.branching_mode == BranchingMode::DistalBranching && self.tree.is_terminal(idx))
    }

    fn candidates(&self, point: &Point, d_lim: f64) -> Vec<VesselIndex> {
        let count = self.data.candidate_count;
        let radius = self.data.close_neighborhood_factor * d_lim;
        let near: Vec<VesselIndex> = self
            .tree
            .segments_within(point, radius)
            .into_iter()
            .filter(|(idx, _)| self.tree.vessel(*idx).map_or(false, |v| self.admissible(*idx, v)))
            .map(|(idx, _)| idx)
            .take(count)
            .collect();
        if !near.is_empty() {
            return near;
        }
        self.tree
            .nearest_segments(point, count, |idx, v| self.admissible(idx, v))
            .into_iter()
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Scores all candidates in parallel, then reduces in candidate order
    /// so the winner does not depend on scheduling.
    fn evaluate(&self, point: &Point, candidates: &[VesselIndex]) -> Option<ScoredTrial> {
        let limits = self.data.trial_limits();
        let evaluator = TrialEvaluator {
            tree: &self.tree,
            domain: &self.domain,
            cost: &self.data.cost_estimator,
            limits: &limits,
        };
        let evaluations: Vec<_> = candidates
            .par_iter()
            .enumerate()
            .map(|(c, idx)| evaluator.evaluate_candidate(c, *idx, point))
            .collect();

        let mut rejections = Rejections::default();
        let mut best: Option<ScoredTrial> = None;
        for evaluation in evaluations {
            rejections.merge(&evaluation.rejections);
            if let Some(trial) = evaluation.best {
                if best.as_ref().map_or(true, |b| trial.cost < b.cost) {
                    best = Some(trial);
                }
            }
        }
        ProgressCounters::add(&self.counters.rejected_topology, rejections.topology);
        ProgressCounters::add(&self.counters.rejected_geometry, rejections.geometry);
        ProgressCounters::add(&self.counters.rejected_hydraulic, rejections.hydraulic);
        trace!(
            "evaluate: candidates={} rejected={} best={:?}",
            candidates.len(),
            rejections.total(),
            best.as_ref().map(|b| (b.candidate, b.junction_index, b.cost))
        );
        best
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    fn commit(&mut self, trial: &ScoredTrial) -> DomainResult<()> {
        let plan = trial.plan;
        let options = self.data.vessel_options();
        let commit = match plan.junction {
            Junction::Split { segment, point } => {
                self.tree
                    .bifurcate(plan.parent, segment, point, plan.new_point, &options)?
            }
            Junction::Distal => self.tree.attach_distal(plan.parent, plan.new_point, &options)?,
        };
        if let Err(err) = self.verify(&commit) {
            self.tree.rollback(&commit)?;
            return Err(err);
        }
        debug!(
            "commit: parent={:?} new={} cost={:.6e} volume={:.6e}",
            plan.parent,
            plan.new_point,
            trial.cost,
            self.tree.volume()
        );
        Ok(())
    }

    /// Re-checks the limits on the solved tree, which may differ from the
    /// trial estimate when viscosity depends on the radius.
    fn verify(&self, commit: &Commit) -> DomainResult<()> {
        let new = self.tree.get(commit.new_vessel())?;
        if new.radius() < self.data.min_radius {
            return Err(DomainError::hydraulic(format!(
                "committed radius {:.4e} below {:.4e}",
                new.radius(),
                self.data.min_radius
            )));
        }
        if let Some(max) = self.data.max_root_pressure {
            let root = self.tree.root().ok_or(DomainError::VesselNotFound)?;
            let pressure = self.tree.get(root)?.proximal_pressure();
            if pressure > max {
                return Err(DomainError::hydraulic(format!(
                    "committed root pressure {pressure:.4e} above {max:.4e}"
                )));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Failure accounting
    // ------------------------------------------------------------------

    fn sync_produced(&self) {
        self.counters
            .produced
            .store(self.produced(), Ordering::Relaxed);
    }

    fn record_failure(&mut self, kind: FailureKind) -> ApplicationResult<StepOutcome> {
        match kind {
            FailureKind::Sampling => ProgressCounters::bump(&self.counters.sampling_failures),
            FailureKind::NoCandidate => ProgressCounters::bump(&self.counters.no_candidate_failures),
            FailureKind::Rollback => ProgressCounters::bump(&self.counters.rollbacks),
        }
        let snapshot = self.counters.snapshot();
        if snapshot.iterations >= self.data.min_iterations_for_failure
            && snapshot.failure_rate() >= self.data.failure_rate_threshold
        {
            return Err(self.run_failure(format!(
                "failure rate reached {:.3} after {} iterations",
                snapshot.failure_rate(),
                snapshot.iterations
            )));
        }
        Ok(StepOutcome::Dropped(kind))
    }

    fn run_failure(&mut self, reason: String) -> ApplicationError {
        self.state = GeneratorState::Failed;
        let snapshot = self.counters.snapshot();
        warn!("run_failure: {}", reason);
        ApplicationError::RunFailure {
            reason,
            produced: self.produced(),
            target: snapshot.target,
            failure_rate: snapshot.failure_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SimpleDomain, Sphere, Stage};
    use rstest::rstest;

    fn sphere_stage(radius: f64, terminals: usize) -> Stage {
        Stage::new(
            Arc::new(SimpleDomain::new(Arc::new(Sphere::new(Point::origin(), radius).unwrap()))),
            terminals,
        )
    }

    fn generator(stages: Vec<Stage>, seed: u64) -> TreeGenerator {
        TreeGenerator::new(
            TreeParameters::default(),
            StagedDomain::new(stages).unwrap(),
            vec![StageSettings::default()],
            seed,
        )
        .unwrap()
    }

    #[test]
    fn given_fresh_generator_when_stepping_then_root_placed_first() {
        let mut g = generator(vec![sphere_stage(10.0, 5)], 3);
        assert_eq!(g.state(), GeneratorState::Init);
        assert_eq!(g.step().unwrap(), StepOutcome::RootPlaced);
        assert_eq!(g.tree().terminal_count(), 1);
        assert_eq!(g.progress().snapshot().produced, 1);
    }

    #[test]
    fn given_small_target_when_generating_then_done_with_exact_count() {
        let mut g = generator(vec![sphere_stage(10.0, 8)], 11);
        let report = g.generate().unwrap();
        assert_eq!(report.state, GeneratorState::Done);
        assert_eq!(report.terminals, 8);
        assert!(report.volume > 0.0);
    }

    #[test]
    fn given_iteration_cap_when_generating_then_stopped_with_valid_tree() {
        let mut g = generator(vec![sphere_stage(10.0, 500)], 5)
            .with_budget(ResourceBudget::unlimited().with_max_iterations(3));
        let report = g.generate().unwrap();
        assert_eq!(report.state, GeneratorState::Stopped);
        assert_eq!(report.stop, Some(StopReason::IterationCap(3)));
        assert!(report.terminals <= 4);
    }

    #[rstest]
    #[case(1)]
    #[case(4)]
    fn given_cap_equal_to_iterations_needed_when_generating_then_done_not_stopped(#[case] terminals: usize) {
        let mut unlimited = generator(vec![sphere_stage(10.0, terminals)], 17);
        let needed = unlimited.generate().unwrap().progress.iterations;

        let mut g = generator(vec![sphere_stage(10.0, terminals)], 17)
            .with_budget(ResourceBudget::unlimited().with_max_iterations(needed));
        let report = g.generate().unwrap();

        assert_eq!(report.state, GeneratorState::Done);
        assert_eq!(report.stop, None);
        assert_eq!(report.terminals, terminals);
    }

    #[test]
    fn given_finished_generator_when_stepping_then_finished_again() {
        let mut g = generator(vec![sphere_stage(10.0, 2)], 1);
        g.generate().unwrap();
        assert_eq!(g.step().unwrap(), StepOutcome::Finished);
    }

    #[test]
    fn given_no_stage_settings_when_constructing_then_parameter_error() {
        let result = TreeGenerator::new(
            TreeParameters::default(),
            StagedDomain::new(vec![sphere_stage(10.0, 2)]).unwrap(),
            Vec::new(),
            0,
        );
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::InvalidParameter { .. }))
        ));
    }
}
