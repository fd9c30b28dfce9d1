//! Vessel selection and tree statistics

use rstest::rstest;

use ccogrow::domain::{
    BranchingMode, BranchingModeFilter, CompositeFilter, HydraulicLaws, Point, StageFilter,
    StatManipulator, TreeParameters, TreeStatsManager, VascularTree, Vessel, VesselAttribute,
    VesselFilter, VesselId, VesselIndex, VesselOptions,
};

/// Mixed stages and branching modes:
/// stage 2 rigid vessels are the first branch, its continuation and the last branch.
fn mixed_tree() -> VascularTree {
    let deformable = VesselOptions::default();
    let rigid = VesselOptions::default().with_branching_mode(BranchingMode::RigidParent);
    let mut t = VascularTree::new(TreeParameters::default(), HydraulicLaws::default()).unwrap();
    let root = t.set_root(Point::new(8.0, 0.0, 0.0), &deformable).unwrap();

    t.set_current_stage(2);
    let a = t
        .bifurcate(root, 0, Point::new(4.0, 0.0, 0.0), Point::new(4.0, 3.0, 0.0), &rigid)
        .unwrap()
        .new_vessel();
    let c1 = t.children(root)[0];
    t.bifurcate(c1, 0, Point::new(6.0, 0.0, 0.0), Point::new(6.0, -3.0, 0.0), &deformable)
        .unwrap();

    t.set_current_stage(1);
    t.bifurcate(a, 0, Point::new(4.0, 1.5, 0.0), Point::new(2.0, 3.0, 0.0), &rigid)
        .unwrap();

    t.set_current_stage(2);
    let c2 = t.children(c1)[0];
    t.bifurcate(c2, 0, Point::new(7.0, 0.0, 0.0), Point::new(7.0, 0.0, 3.0), &rigid)
        .unwrap();
    t
}

fn ids(selected: Vec<(VesselIndex, &Vessel)>) -> Vec<VesselId> {
    let mut ids: Vec<VesselId> = selected.into_iter().map(|(_, v)| v.id).collect();
    ids.sort_unstable();
    ids
}

// ============================================================
// Filters
// ============================================================

#[test]
fn given_rigid_and_stage_two_when_filtering_then_exact_selection() {
    let tree = mixed_tree();
    let expected: Vec<VesselId> = {
        let mut v: Vec<VesselId> = tree
            .vessels()
            .filter(|(_, v)| v.branching_mode == BranchingMode::RigidParent && v.stage == 2)
            .map(|(_, v)| v.id)
            .collect();
        v.sort_unstable();
        v
    };

    let filter = CompositeFilter::all()
        .with(BranchingModeFilter(BranchingMode::RigidParent))
        .with(StageFilter(2));

    assert_eq!(expected.len(), 3);
    assert_eq!(ids(filter.apply(&tree)), expected);
}

#[test]
fn given_and_filter_when_reordering_children_then_same_selection() {
    let tree = mixed_tree();
    let forward = CompositeFilter::all()
        .with(BranchingModeFilter(BranchingMode::RigidParent))
        .with(StageFilter(2));
    let backward = CompositeFilter::all()
        .with(StageFilter(2))
        .with(BranchingModeFilter(BranchingMode::RigidParent));

    assert_eq!(ids(forward.apply(&tree)), ids(backward.apply(&tree)));
}

#[test]
fn given_or_filter_when_applied_then_union_of_children() {
    let tree = mixed_tree();
    let rigid = ids(BranchingModeFilter(BranchingMode::RigidParent).apply(&tree));
    let stage_two = ids(StageFilter(2).apply(&tree));
    let mut union: Vec<VesselId> = rigid.iter().chain(stage_two.iter()).copied().collect();
    union.sort_unstable();
    union.dedup();

    let filter = CompositeFilter::any()
        .with(BranchingModeFilter(BranchingMode::RigidParent))
        .with(StageFilter(2));

    assert_eq!(ids(filter.apply(&tree)), union);
}

#[test]
fn given_nested_composites_when_applied_then_evaluated_recursively() {
    let tree = mixed_tree();
    let filter = CompositeFilter::any()
        .with(CompositeFilter::all().with(StageFilter(1)).with(BranchingModeFilter(BranchingMode::RigidParent)))
        .with(StageFilter(0));

    let selected = filter.apply(&tree);

    assert!(selected
        .iter()
        .all(|(_, v)| v.stage == 0 || (v.stage == 1 && v.branching_mode == BranchingMode::RigidParent)));
    assert_eq!(selected.iter().filter(|(_, v)| v.stage == 1).count(), 1);
}

// ============================================================
// Statistics
// ============================================================

#[test]
fn given_tree_when_averaging_per_level_then_root_level_is_root_radius() {
    let tree = mixed_tree();
    let per_level = TreeStatsManager::new().mean_per_level(&tree, VesselAttribute::Radius);

    assert!((per_level[&0] - tree.params().root_radius).abs() < 1e-12);
    assert_eq!(per_level.len(), tree.depth());
}

#[test]
fn given_filtered_manager_when_collecting_then_only_selected_vessels() {
    let tree = mixed_tree();
    let manager = TreeStatsManager::with_filter(StageFilter(2));

    let stages = manager.collect(&tree, VesselAttribute::Stage);

    assert!(!stages.is_empty());
    assert!(stages.iter().all(|s| *s == 2.0));
}

#[rstest]
#[case(StatManipulator::Mean)]
#[case(StatManipulator::Percentile(50.0))]
#[case(StatManipulator::StdDev)]
fn given_empty_selection_when_computing_then_none(#[case] manipulator: StatManipulator) {
    let tree = mixed_tree();
    let manager = TreeStatsManager::with_filter(StageFilter(7));
    assert_eq!(manager.compute(&tree, VesselAttribute::Length, manipulator), None);
}

#[test]
fn given_flow_when_summing_terminals_then_equals_inflow() {
    let tree = mixed_tree();
    let total: f64 = tree.terminals().map(|(_, v)| v.flow()).sum();
    assert!((total - tree.params().inflow).abs() < 1e-12);
}
