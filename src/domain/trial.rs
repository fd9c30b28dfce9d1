//! Trial placements: junction enumeration, incremental hydraulics and
//! constraint checks

use std::f64::consts::{FRAC_PI_2, PI};

use tracing::trace;

use crate::domain::arena::VesselIndex;
use crate::domain::cost::{CandidateMetrics, CostEstimator, PowerTerm};
use crate::domain::error::{DomainError, DomainResult, GeometryViolation};
use crate::domain::geometry::{angle_between, segment_segment_distance, Point};
use crate::domain::hydraulics::{local_resistance, murray_betas, reduced_resistance};
use crate::domain::space::Domain;
use crate::domain::tree::VascularTree;
use crate::domain::vessel::{BranchingMode, Vessel, VesselFunction};

const MIN_LENGTH: f64 = 1e-9;

/// Where the new vessel connects to its parent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Junction {
    /// Split the parent on polyline segment `segment` at `point`
    Split { segment: usize, point: Point },
    /// Attach at the parent's distal end
    Distal,
}

/// A candidate placement of one new terminal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrialPlan {
    pub parent: VesselIndex,
    pub junction: Junction,
    pub new_point: Point,
}

impl TrialPlan {
    pub fn junction_point(&self, parent: &Vessel) -> Point {
        match self.junction {
            Junction::Split { point, .. } => point,
            Junction::Distal => parent.distal(),
        }
    }
}

/// Hydraulic outcome of a trial, computed without mutating the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialHydraulics {
    pub volume_before: f64,
    pub volume_after: f64,
    pub root_pressure: f64,
    pub new_radius: f64,
    /// Radius ratios of the vessels meeting at the junction, new vessel last
    pub sibling_betas: Vec<f64>,
    /// Level of the vessel being branched
    pub junction_level: usize,
    /// Parent radius before the trial
    pub parent_radius: f64,
    pub distance_to_parent: f64,
    /// Children ratios of every ancestor above the parent, nearest first
    pub ancestor_betas: Vec<Vec<f64>>,
}

impl TrialHydraulics {
    pub fn volume_delta(&self) -> f64 {
        self.volume_after - self.volume_before
    }

    pub fn metrics(&self) -> CandidateMetrics {
        CandidateMetrics {
            volume_delta: self.volume_delta(),
            parent_radius: self.parent_radius,
            distance_to_parent: self.distance_to_parent,
            power_delta: 0.0,
        }
    }

    /// Smallest over largest sibling ratio; 1 for a single child.
    pub fn symmetry(&self) -> f64 {
        let max = self.sibling_betas.iter().copied().fold(0.0, f64::max);
        let min = self.sibling_betas.iter().copied().fold(f64::INFINITY, f64::min);
        if max > 0.0 {
            min / max
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Summary {
    common: usize,
    reserved: f64,
    r_star: f64,
    weight: f64,
}

impl Summary {
    fn of(vessel: &Vessel) -> Self {
        let h = vessel.hydraulics();
        Self {
            common: h.common_terminals,
            reserved: h.reserved_sum,
            r_star: h.resistance,
            weight: h.volume_weight,
        }
    }
}

impl VascularTree {
    /// Hydraulics of the tree as it would be after committing `plan`.
    ///
    /// Only the path from the junction to the root is re-evaluated; sibling
    /// subtrees keep their cached reduced resistances and volume weights.
    /// Exact for level- and radius-independent viscosity.
    pub fn evaluate_trial(&self, plan: &TrialPlan) -> DomainResult<TrialHydraulics> {
        let node = self.node(plan.parent)?;
        let parent = &node.vessel;
        let h = parent.hydraulics();
        let level = h.level;
        let laws = self.laws();
        let nu_child = laws.viscosity.viscosity(level + 1, h.radius);
        let gamma = laws.murray_exponent.value(level);

        let root = self.root().ok_or(DomainError::VesselNotFound)?;
        let root_summary = Summary::of(self.get(root)?);

        let junction = plan.junction_point(parent);
        let new_length = junction.distance(&plan.new_point);
        if new_length <= MIN_LENGTH {
            return Err(GeometryViolation::Degenerate.into());
        }
        let new_r_star = local_resistance(nu_child, new_length);
        let new_weight = PI * new_length;

        // Common terminals the trial adds to every ancestor
        let added = match plan.junction {
            Junction::Distal if node.children.is_empty() => 0,
            _ => 1,
        };
        let term_flow = self.terminal_flow_for(root_summary.common + added, root_summary.reserved);

        let (summary, sibling_betas) = match plan.junction {
            Junction::Split { segment, point } => {
                let (proximal, distal) = parent.split_points(segment, point);
                let lp = polyline_length(&proximal);
                let lc = polyline_length(&distal);
                if lp <= MIN_LENGTH || lc <= MIN_LENGTH {
                    return Err(GeometryViolation::Degenerate.into());
                }
                let downstream = h.resistance - h.local_resistance;
                let cont = Summary {
                    common: h.common_terminals,
                    reserved: h.reserved_sum,
                    r_star: local_resistance(nu_child, lc) + downstream,
                    weight: PI * lc + (h.volume_weight - PI * parent.length()),
                };
                let branches = [
                    (self.flow_of(cont.common, cont.reserved, term_flow), cont.r_star),
                    (term_flow, new_r_star),
                ];
                let betas = murray_betas(&branches, gamma);
                let nu = laws.viscosity.viscosity(level, h.radius);
                let r_star = reduced_resistance(
                    local_resistance(nu, lp),
                    [(betas[0], cont.r_star), (betas[1], new_r_star)],
                );
                let weight = PI * lp + betas[0].powi(2) * cont.weight + betas[1].powi(2) * new_weight;
                (
                    Summary {
                        common: h.common_terminals + 1,
                        reserved: h.reserved_sum,
                        r_star,
                        weight,
                    },
                    betas,
                )
            }
            Junction::Distal if node.children.is_empty() => {
                let summary = Summary {
                    common: h.common_terminals,
                    reserved: h.reserved_sum,
                    r_star: h.local_resistance + new_r_star,
                    weight: PI * parent.length() + new_weight,
                };
                (summary, vec![1.0])
            }
            Junction::Distal => {
                let mut parts: Vec<Summary> = node
                    .children
                    .iter()
                    .filter_map(|c| self.vessel(*c).map(Summary::of))
                    .collect();
                parts.push(Summary {
                    common: 1,
                    reserved: 0.0,
                    r_star: new_r_star,
                    weight: new_weight,
                });
                let branches: Vec<(f64, f64)> = parts
                    .iter()
                    .map(|s| (self.flow_of(s.common, s.reserved, term_flow), s.r_star))
                    .collect();
                let betas = murray_betas(&branches, gamma);
                let r_star = reduced_resistance(
                    h.local_resistance,
                    betas.iter().zip(&parts).map(|(b, s)| (*b, s.r_star)),
                );
                let weight = PI * parent.length()
                    + betas
                        .iter()
                        .zip(&parts)
                        .map(|(b, s)| b * b * s.weight)
                        .sum::<f64>();
                (
                    Summary {
                        common: h.common_terminals + 1,
                        reserved: h.reserved_sum,
                        r_star,
                        weight,
                    },
                    betas,
                )
            }
        };

        // Walk to the root
        let mut current = plan.parent;
        let mut summary = summary;
        let mut path_betas = Vec::new();
        let mut ancestor_betas = Vec::new();
        while let Some(ancestor) = self.parent(current) {
            let a_node = self.node(ancestor)?;
            let a = a_node.vessel.hydraulics();
            let mut position = 0;
            let parts: Vec<Summary> = a_node
                .children
                .iter()
                .enumerate()
                .filter_map(|(i, c)| {
                    if *c == current {
                        position = i;
                        Some(summary)
                    } else {
                        self.vessel(*c).map(Summary::of)
                    }
                })
                .collect();
            let branches: Vec<(f64, f64)> = parts
                .iter()
                .map(|s| (self.flow_of(s.common, s.reserved, term_flow), s.r_star))
                .collect();
            let betas = murray_betas(&branches, laws.murray_exponent.value(a.level));
            let r_star = reduced_resistance(
                a.local_resistance,
                betas.iter().zip(&parts).map(|(b, s)| (*b, s.r_star)),
            );
            let weight = PI * a_node.vessel.length()
                + betas
                    .iter()
                    .zip(&parts)
                    .map(|(b, s)| b * b * s.weight)
                    .sum::<f64>();
            path_betas.push(betas.get(position).copied().unwrap_or(1.0));
            ancestor_betas.push(betas);
            summary = Summary {
                common: a.common_terminals + added,
                reserved: a.reserved_sum,
                r_star,
                weight,
            };
            current = ancestor;
        }

        let params = self.params();
        let r_root = params.root_radius;
        let root_flow = self.flow_of(summary.common, summary.reserved, term_flow);
        let parent_radius_after = r_root * path_betas.iter().product::<f64>();
        let beta_new = sibling_betas.last().copied().unwrap_or(1.0);

        Ok(TrialHydraulics {
            volume_before: self.volume(),
            volume_after: r_root * r_root * summary.weight,
            root_pressure: summary.r_star * root_flow / r_root.powi(4) + params.reference_pressure,
            new_radius: parent_radius_after * beta_new,
            sibling_betas,
            junction_level: level,
            parent_radius: h.radius,
            distance_to_parent: parent.distance_to(&plan.new_point),
            ancestor_betas,
        })
    }

    /// Sum of `terms` over every vessel of the tree.
    pub fn power_cost(&self, terms: &[PowerTerm]) -> f64 {
        self.root()
            .map_or(0.0, |root| self.power_sums(root, terms).iter().sum())
    }

    /// Change of the power cost if `plan` were committed.
    ///
    /// Subtrees off the junction-to-root path keep their internal ratios, so
    /// their cost only rescales with the new radius at their top.
    pub fn power_cost_delta(
        &self,
        plan: &TrialPlan,
        hydraulics: &TrialHydraulics,
        terms: &[PowerTerm],
    ) -> DomainResult<f64> {
        let node = self.node(plan.parent)?;
        let parent = &node.vessel;
        let cost = |length: f64, radius: f64| -> f64 { terms.iter().map(|t| t.vessel_cost(length, radius)).sum() };

        let mut path = vec![plan.parent];
        let mut current = plan.parent;
        while let Some(ancestor) = self.parent(current) {
            path.push(ancestor);
            current = ancestor;
        }
        path.reverse();
        if path.len() != hydraulics.ancestor_betas.len() + 1 {
            return Err(DomainError::topology("trial path does not match the tree"));
        }

        // Root down to the parent
        let mut after = 0.0;
        let mut radius = self.params().root_radius;
        for (depth, betas) in hydraulics.ancestor_betas.iter().rev().enumerate() {
            let ancestor = path[depth];
            after += cost(self.get(ancestor)?.length(), radius);
            let mut next_radius = radius;
            for (child, beta) in self.children(ancestor).iter().zip(betas) {
                if *child == path[depth + 1] {
                    next_radius = radius * beta;
                } else {
                    after += self.scaled_power_cost(*child, radius * beta, terms)?;
                }
            }
            radius = next_radius;
        }

        let new_length = plan.junction_point(parent).distance(&plan.new_point);
        let betas = &hydraulics.sibling_betas;
        let beta_new = betas.last().copied().unwrap_or(1.0);
        match plan.junction {
            Junction::Split { segment, point } => {
                let (proximal, distal) = parent.split_points(segment, point);
                let beta_cont = betas.first().copied().unwrap_or(1.0);
                let cont_radius = radius * beta_cont;
                after += cost(polyline_length(&proximal), radius) + cost(polyline_length(&distal), cont_radius);
                let before = parent.radius();
                for child in &node.children {
                    let ratio = if before > 0.0 { self.get(*child)?.radius() / before } else { 1.0 };
                    after += self.scaled_power_cost(*child, cont_radius * ratio, terms)?;
                }
            }
            Junction::Distal => {
                after += cost(parent.length(), radius);
                for (child, beta) in node.children.iter().zip(betas) {
                    after += self.scaled_power_cost(*child, radius * beta, terms)?;
                }
            }
        }
        after += cost(new_length, radius * beta_new);
        Ok(after - self.power_cost(terms))
    }

    /// One sum per term over the subtree rooted at `idx`.
    fn power_sums(&self, idx: VesselIndex, terms: &[PowerTerm]) -> Vec<f64> {
        let mut sums = vec![0.0; terms.len()];
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(vessel) = self.vessel(current) {
                for (sum, term) in sums.iter_mut().zip(terms) {
                    *sum += term.vessel_cost(vessel.length(), vessel.radius());
                }
            }
            stack.extend_from_slice(self.children(current));
        }
        sums
    }

    fn scaled_power_cost(&self, idx: VesselIndex, top_radius: f64, terms: &[PowerTerm]) -> DomainResult<f64> {
        let before = self.get(idx)?.radius();
        let ratio = if before > 0.0 { top_radius / before } else { 1.0 };
        Ok(self
            .power_sums(idx, terms)
            .iter()
            .zip(terms)
            .map(|(sum, term)| sum * ratio.powf(term.radius_exponent))
            .sum())
    }
}

fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

/// Per-run limits applied to every trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialLimits {
    /// Partitions of the junction search grid
    pub bifurcation_tests: usize,
    pub min_radius: f64,
    pub max_root_pressure: Option<f64>,
}

impl Default for TrialLimits {
    fn default() -> Self {
        Self {
            bifurcation_tests: 7,
            min_radius: 0.0,
            max_root_pressure: None,
        }
    }
}

/// Best placement found for one candidate parent.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTrial {
    pub candidate: usize,
    pub junction_index: usize,
    pub plan: TrialPlan,
    pub hydraulics: TrialHydraulics,
    pub cost: f64,
}

/// Rejection counts of one candidate, by error family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rejections {
    pub topology: usize,
    pub geometry: usize,
    pub hydraulic: usize,
}

impl Rejections {
    fn record(&mut self, err: &DomainError) {
        match err {
            DomainError::InvalidTopology { .. } => self.topology += 1,
            DomainError::HydraulicConstraintViolation { .. } => self.hydraulic += 1,
            _ => self.geometry += 1,
        }
    }

    pub fn merge(&mut self, other: &Rejections) {
        self.topology += other.topology;
        self.geometry += other.geometry;
        self.hydraulic += other.hydraulic;
    }

    pub fn total(&self) -> usize {
        self.topology + self.geometry + self.hydraulic
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateEvaluation {
    pub best: Option<ScoredTrial>,
    pub rejections: Rejections,
}

/// Scores trial placements against a frozen tree and domain.
///
/// Holds shared borrows only, so one evaluator can serve parallel workers.
pub struct TrialEvaluator<'a> {
    pub tree: &'a VascularTree,
    pub domain: &'a dyn Domain,
    pub cost: &'a CostEstimator,
    pub limits: &'a TrialLimits,
}

impl<'a> TrialEvaluator<'a> {
    /// Junction positions on `parent` allowed by its branching mode.
    pub fn junctions(&self, parent: VesselIndex, new_point: &Point) -> DomainResult<Vec<TrialPlan>> {
        let vessel = self.tree.get(parent)?;
        let split = |segment: usize, point: Point| TrialPlan {
            parent,
            junction: Junction::Split { segment, point },
            new_point: *new_point,
        };
        let n = self.limits.bifurcation_tests.max(2);
        let plans = match vessel.branching_mode {
            BranchingMode::NoBranching => Vec::new(),
            BranchingMode::DistalBranching => vec![TrialPlan {
                parent,
                junction: Junction::Distal,
                new_point: *new_point,
            }],
            BranchingMode::RigidParent => {
                let s = vessel.closest_segment(new_point);
                let (a, b) = segment_of(vessel, s);
                (1..n).map(|i| split(s, a.lerp(&b, i as f64 / n as f64))).collect()
            }
            BranchingMode::DeformableParent => {
                let s = vessel.closest_segment(new_point);
                let (a, b) = segment_of(vessel, s);
                let mut plans = Vec::new();
                for i in 0..n {
                    for j in 0..(n - i) {
                        if i == 0 && j == 0 {
                            continue;
                        }
                        let point = a + (b - a) * (i as f64 / n as f64) + (*new_point - a) * (j as f64 / n as f64);
                        plans.push(split(s, point));
                    }
                }
                plans
            }
            BranchingMode::OnlyAtParentHotspots => {
                if vessel.is_multi_segment() {
                    let points = vessel.points();
                    (1..points.len() - 1).map(|k| split(k - 1, points[k])).collect()
                } else {
                    vessel.hotspots().into_iter().map(|p| split(0, p)).collect()
                }
            }
        };
        Ok(plans)
    }

    /// Checks one plan; returns its hydraulics when every constraint holds.
    pub fn check(&self, plan: &TrialPlan) -> DomainResult<TrialHydraulics> {
        let node = self.tree.node(plan.parent)?;
        let parent = &node.vessel;
        if node.children.len() >= parent.branching_mode.max_children()
            && plan.junction == Junction::Distal
        {
            return Err(DomainError::topology("parent cannot take another child"));
        }
        let junction = plan.junction_point(parent);
        let new_point = plan.new_point;
        let bifurcates = !matches!(plan.junction, Junction::Distal) || !node.children.is_empty();

        // Angle bounds
        match plan.junction {
            Junction::Split { segment, .. } => {
                let (a, b) = split_neighbours(parent, segment, &junction);
                check_split_angles(
                    &junction,
                    &a,
                    &b,
                    &new_point,
                    self.domain.min_bifurcation_angle(),
                    self.domain.min_plane_angle(),
                )?;
            }
            Junction::Distal if bifurcates => {
                let (a, b) = segment_of(parent, parent.points().len() - 2);
                let max_angle = FRAC_PI_2 - self.domain.min_bifurcation_angle();
                if deviation(&(b - a), &(new_point - junction)) > max_angle {
                    return Err(GeometryViolation::AngleBound.into());
                }
            }
            Junction::Distal => {}
        }

        // Containment
        let mut pieces: Option<(Point, Point)> = None;
        if !self.domain.is_segment_inside(&junction, &new_point) {
            return Err(GeometryViolation::OutsideDomain.into());
        }
        if let (Junction::Split { segment, .. }, BranchingMode::DeformableParent) =
            (plan.junction, parent.branching_mode)
        {
            let (a, b) = segment_of(parent, segment);
            let proximal_exempt = parent.function == VesselFunction::Perforator;
            if !proximal_exempt && !self.domain.is_segment_inside(&a, &junction) {
                return Err(GeometryViolation::OutsideDomain.into());
            }
            if !self.domain.is_segment_inside(&junction, &b) {
                return Err(GeometryViolation::OutsideDomain.into());
            }
            pieces = Some((a, b));
        }

        let hydraulics = self.tree.evaluate_trial(plan)?;

        // Intersection with neighbours
        let new_touches = match plan.junction {
            Junction::Split { .. } => Touching::Parent,
            Junction::Distal => Touching::Distal,
        };
        let mut trial_segments = vec![(junction, new_point, hydraulics.new_radius, new_touches)];
        if let (Some((a, b)), Junction::Split { segment, .. }) = (pieces, plan.junction) {
            let last = parent.points().len() - 2;
            let proximal = if segment == 0 { Touching::Proximal } else { Touching::Parent };
            let distal = if segment == last { Touching::Distal } else { Touching::Parent };
            trial_segments.push((a, junction, hydraulics.parent_radius, proximal));
            trial_segments.push((junction, b, hydraulics.parent_radius, distal));
        }
        for (a, b, radius, touches) in &trial_segments {
            let excluded = self.touching(plan.parent, *touches);
            let margin = self.tree.params().root_radius + radius;
            for idx in self.tree.segments_near(a, b, margin) {
                if excluded.contains(&idx) {
                    continue;
                }
                let Some(other) = self.tree.vessel(idx) else { continue };
                let clearance = other.radius() + radius;
                if other
                    .segments()
                    .any(|(c, d)| segment_segment_distance(a, b, &c, &d) < clearance)
                {
                    return Err(GeometryViolation::VesselCrossing.into());
                }
            }
        }

        // Hydraulic limits
        let laws = self.tree.laws();
        let limit = laws.symmetry_limit.value(hydraulics.junction_level);
        if hydraulics.sibling_betas.len() > 1 && hydraulics.symmetry() < limit {
            return Err(DomainError::hydraulic(format!(
                "symmetry {:.4} below {:.4}",
                hydraulics.symmetry(),
                limit
            )));
        }
        if let Some(max) = self.limits.max_root_pressure {
            if hydraulics.root_pressure > max {
                return Err(DomainError::hydraulic(format!(
                    "root pressure {:.4e} above {:.4e}",
                    hydraulics.root_pressure, max
                )));
            }
        }
        if hydraulics.new_radius < self.limits.min_radius {
            return Err(DomainError::hydraulic(format!(
                "radius {:.4e} below {:.4e}",
                hydraulics.new_radius, self.limits.min_radius
            )));
        }
        Ok(hydraulics)
    }

    /// Evaluates every junction of one candidate parent; the cheapest
    /// admissible one wins, the first on ties.
    pub fn evaluate_candidate(&self, candidate: usize, parent: VesselIndex, new_point: &Point) -> CandidateEvaluation {
        let mut evaluation = CandidateEvaluation::default();
        let plans = match self.junctions(parent, new_point) {
            Ok(plans) => plans,
            Err(err) => {
                evaluation.rejections.record(&err);
                return evaluation;
            }
        };
        let power_terms = self.cost.power_terms();
        for (junction_index, plan) in plans.into_iter().enumerate() {
            let scored = self.check(&plan).and_then(|hydraulics| {
                let mut metrics = hydraulics.metrics();
                if let Some(terms) = &power_terms {
                    metrics.power_delta = self.tree.power_cost_delta(&plan, &hydraulics, terms)?;
                }
                Ok((hydraulics, metrics))
            });
            match scored {
                Ok((hydraulics, metrics)) => {
                    let cost = self.cost.evaluate(&metrics);
                    let better = evaluation
                        .best
                        .as_ref()
                        .map_or(true, |best| cost < best.cost);
                    if cost.is_finite() && better {
                        evaluation.best = Some(ScoredTrial {
                            candidate,
                            junction_index,
                            plan,
                            hydraulics,
                            cost,
                        });
                    }
                }
                Err(err) => {
                    trace!("evaluate_candidate: c={} j={} rejected: {}", candidate, junction_index, err);
                    evaluation.rejections.record(&err);
                }
            }
        }
        evaluation
    }

    /// Vessels meeting a trial segment at one of its endpoints. Everything
    /// else must keep its clearance.
    fn touching(&self, parent: VesselIndex, touching: Touching) -> Vec<VesselIndex> {
        let mut excluded = vec![parent];
        match touching {
            Touching::Parent => {}
            Touching::Distal => excluded.extend_from_slice(self.tree.children(parent)),
            Touching::Proximal => {
                if let Some(grand) = self.tree.parent(parent) {
                    excluded.push(grand);
                    excluded.extend_from_slice(self.tree.children(grand));
                }
            }
        }
        excluded
    }
}

/// Which existing vessels share an endpoint with a trial segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Touching {
    /// Only the parent, at the junction
    Parent,
    /// The parent and its children, at the parent's distal point
    Distal,
    /// The parent, its parent and its siblings, at the parent's proximal point
    Proximal,
}

/// Distance of the angle between `u` and `v` from a right angle.
fn deviation(u: &Point, v: &Point) -> f64 {
    (angle_between(u, v) - FRAC_PI_2).abs()
}

/// Angle bounds of a split at `junction` between the parent points `a` and `b`.
///
/// The new branch must stay within `π/2 - min_angle` of the normal to both
/// deformed halves, and open at least `min_plane` away from their plane.
/// A straight split has no plane and passes the opening test.
fn check_split_angles(
    junction: &Point,
    a: &Point,
    b: &Point,
    new_point: &Point,
    min_angle: f64,
    min_plane: f64,
) -> DomainResult<()> {
    let new = *new_point - *junction;
    let distal = *b - *junction;
    let proximal = *a - *junction;
    let max_angle = FRAC_PI_2 - min_angle;
    if deviation(&new, &distal) > max_angle || deviation(&new, &proximal) > max_angle {
        return Err(GeometryViolation::AngleBound.into());
    }
    if min_plane > 0.0 {
        let normal = proximal.cross(&distal);
        if normal.norm() > 1e-9 * proximal.norm() * distal.norm() {
            let opening = FRAC_PI_2 - angle_between(&new, &normal).min(PI - angle_between(&new, &normal));
            if opening < min_plane {
                return Err(GeometryViolation::OpeningAngle.into());
            }
        }
    }
    Ok(())
}

/// Nearest polyline points before and after a junction on `segment`,
/// skipping a joint the junction sits on.
fn split_neighbours(vessel: &Vessel, segment: usize, junction: &Point) -> (Point, Point) {
    let points = vessel.points();
    let s = segment.min(points.len() - 2);
    let before = points[..=s]
        .iter()
        .rev()
        .find(|p| p.distance(junction) > MIN_LENGTH)
        .copied()
        .unwrap_or(points[0]);
    let after = points[s + 1..]
        .iter()
        .find(|p| p.distance(junction) > MIN_LENGTH)
        .copied()
        .unwrap_or(points[points.len() - 1]);
    (before, after)
}

fn segment_of(vessel: &Vessel, segment: usize) -> (Point, Point) {
    let points = vessel.points();
    let s = segment.min(points.len() - 2);
    (points[s], points[s + 1])
}
