//! End-to-end growth runs

use std::sync::Arc;

use parking_lot::Mutex;

use ccogrow::application::{
    ApplicationError, CandidateStrategy, GeneratorData, GeneratorState, StageSettings, StepOutcome,
    TreeGenerator,
};
use ccogrow::domain::{
    Cuboid, Domain, DomainObserver, HydraulicLaws, Point, SimpleDomain, Sphere, Stage, StageTransition,
    StagedDomain, TreeParameters, VascularTree,
};
use ccogrow::util::testing;

fn sphere(radius: f64) -> Arc<dyn Domain> {
    Arc::new(SimpleDomain::new(Arc::new(Sphere::new(Point::origin(), radius).unwrap())))
}

fn generator(stages: Vec<Stage>, data: GeneratorData, seed: u64) -> TreeGenerator {
    TreeGenerator::new(
        TreeParameters::default(),
        StagedDomain::new(stages).unwrap(),
        vec![StageSettings::new(data, HydraulicLaws::default())],
        seed,
    )
    .unwrap()
}

fn assert_murray(tree: &VascularTree) {
    for (idx, vessel) in tree.vessels() {
        let children = tree.children(idx);
        if children.is_empty() {
            continue;
        }
        let sum: f64 = children.iter().map(|c| tree.vessel(*c).unwrap().radius().powi(3)).sum();
        let parent = vessel.radius().powi(3);
        assert!((parent - sum).abs() <= 1e-9 * parent);
    }
}

/// Records each event in arrival order so stage notifications can be
/// placed relative to commits.
#[derive(Default)]
struct EventLog {
    events: Mutex<Vec<String>>,
}

impl DomainObserver for EventLog {
    fn stage_changed(&self, transition: &StageTransition) {
        self.events.lock().push(format!("stage {}", transition.current));
    }
}

// ============================================================
// Single stage
// ============================================================

#[test]
fn given_spaced_sphere_when_growing_fifty_then_done_or_failure_above_threshold() {
    testing::init_test_setup();
    let data = GeneratorData {
        min_terminal_distance: 0.5,
        ..GeneratorData::default()
    };
    let mut g = generator(vec![Stage::new(sphere(10.0), 50)], data, 17);

    match g.generate() {
        Ok(report) => {
            assert_eq!(report.state, GeneratorState::Done);
            assert_eq!(report.terminals, 50);
            assert_murray(g.tree());
        }
        Err(ApplicationError::RunFailure { failure_rate, .. }) => {
            assert!(failure_rate >= g.current_data().failure_rate_threshold);
            assert_eq!(g.state(), GeneratorState::Failed);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[test]
fn given_grown_tree_when_checking_volume_then_matches_vessel_sum() {
    let mut g = generator(vec![Stage::new(sphere(10.0), 25)], GeneratorData::default(), 4);
    let report = g.generate().unwrap();

    let sum: f64 = g.tree().vessels().map(|(_, v)| v.volume()).sum();
    assert!((report.volume - sum).abs() <= 1e-9 * sum);
    assert_murray(g.tree());
}

#[test]
fn given_same_seed_when_growing_twice_then_identical_trees() {
    let run = |seed| {
        let mut g = generator(vec![Stage::new(sphere(8.0), 20)], GeneratorData::default(), seed);
        g.generate().unwrap();
        g.into_tree().vessel_data()
    };
    assert_eq!(run(99), run(99));
}

#[test]
fn given_fixed_perfusion_radius_when_growing_then_terminal_balls_disjoint() {
    let data = GeneratorData {
        strategy: CandidateStrategy::FixedPerfusionRadius { radius: 1.0 },
        ..GeneratorData::default()
    };
    let mut g = generator(vec![Stage::new(sphere(10.0), 20)], data, 8);

    let report = g.generate().unwrap();

    assert_eq!(report.state, GeneratorState::Done);
    let ends: Vec<Point> = g.tree().terminals().map(|(_, v)| v.distal()).collect();
    assert_eq!(ends.len(), 20);
    for (i, a) in ends.iter().enumerate() {
        for b in &ends[i + 1..] {
            assert!(a.distance(b) >= 2.0, "terminals {a} and {b} overlap");
        }
    }
}

// ============================================================
// Stages
// ============================================================

#[test]
fn given_two_stages_when_stepping_then_single_advance_seen_before_next_commit() {
    let log = Arc::new(EventLog::default());
    let mut g = generator(
        vec![Stage::new(sphere(10.0), 10), Stage::new(sphere(10.0), 20)],
        GeneratorData::default(),
        21,
    );
    g.register_observer(log.clone());

    let mut advances = 0;
    loop {
        match g.step().unwrap() {
            StepOutcome::StageAdvanced { stage } => {
                advances += 1;
                assert_eq!(stage, 1);
                assert_eq!(g.tree().terminal_count(), 10);
            }
            StepOutcome::Committed { terminals } => {
                log.events.lock().push(format!("commit {terminals}"));
            }
            StepOutcome::Finished | StepOutcome::Stopped(_) => break,
            StepOutcome::RootPlaced | StepOutcome::Dropped(_) => {}
        }
    }

    assert_eq!(advances, 1);
    let events = log.events.lock();
    let at = events.iter().position(|e| e == "stage 1").unwrap();
    assert_eq!(events[at - 1], "commit 10");
    assert_eq!(events[at + 1], "commit 11");
    assert_eq!(g.state(), GeneratorState::Done);
    assert_eq!(g.tree().terminal_count(), 30);
    assert_eq!(g.tree().current_stage(), 1);
    assert!(g.tree().vessels().any(|(_, v)| v.stage == 1));
}

#[test]
fn given_flat_second_stage_when_growing_then_run_failure_keeps_first_stage() {
    let flat: Arc<dyn Domain> = Arc::new(
        SimpleDomain::new(Arc::new(Cuboid::new(Point::origin(), Point::new(1.0, 1.0, 0.0))))
            .with_sampling_budget(16),
    );
    let mut g = generator(
        vec![Stage::new(sphere(10.0), 5), Stage::new(flat, 5)],
        GeneratorData::default(),
        2,
    );

    let err = g.generate().unwrap_err();

    match err {
        ApplicationError::RunFailure { produced, target, .. } => {
            assert_eq!(produced, 5);
            assert_eq!(target, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(g.state(), GeneratorState::Failed);
    assert_eq!(g.tree().terminal_count(), 5);
    assert_murray(g.tree());
}

// ============================================================
// Resume
// ============================================================

#[test]
fn given_existing_tree_when_resuming_then_targets_count_new_terminals() {
    let mut first = generator(vec![Stage::new(sphere(10.0), 6)], GeneratorData::default(), 12);
    first.generate().unwrap();
    let tree = first.into_tree();

    let mut resumed = TreeGenerator::with_tree(
        tree,
        StagedDomain::single(sphere(10.0), 4),
        vec![StageSettings::default()],
        13,
    )
    .unwrap();
    let report = resumed.generate().unwrap();

    assert_eq!(report.produced, 4);
    assert_eq!(report.terminals, 10);
}
