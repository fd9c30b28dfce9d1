//! Vascular tree: arena-owned vessel graph with hydraulic state

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::domain::arena::{VesselArena, VesselIndex, VesselNode};
use crate::domain::constraint::HydraulicLaws;
use crate::domain::error::{DomainError, DomainResult, GeometryViolation};
use crate::domain::geometry::{BoundingBox, Point};
use crate::domain::hydraulics::{local_resistance, murray_betas, reduced_resistance};
use crate::domain::spatial::SpatialGrid;
use crate::domain::vessel::{
    BranchingMode, TerminalType, Vessel, VesselFunction, VesselId, VesselOptions,
};

const MIN_LENGTH: f64 = 1e-9;
const BETA_TOLERANCE: f64 = 1e-10;
const MAX_SOLVE_PASSES: usize = 100;

/// Fixed boundary conditions of the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParameters {
    /// Proximal point of the root vessel
    pub perfusion_point: Point,
    pub root_radius: f64,
    /// Inflow at the root
    pub inflow: f64,
    /// Pressure at the terminals
    pub reference_pressure: f64,
    /// Spatial index resolution
    pub cell_size: f64,
}

impl Default for TreeParameters {
    fn default() -> Self {
        Self {
            perfusion_point: Point::origin(),
            root_radius: 0.5,
            inflow: 1.0,
            reference_pressure: 0.0,
            cell_size: 1.0,
        }
    }
}

/// Structural change applied by a commit; enough to undo it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    Bifurcation {
        parent: VesselIndex,
        new: VesselIndex,
        continuation: VesselIndex,
        /// The junction was added to the polyline rather than reusing a joint
        inserted_joint: bool,
    },
    Distal {
        parent: VesselIndex,
        new: VesselIndex,
    },
}

impl Commit {
    pub fn new_vessel(&self) -> VesselIndex {
        match self {
            Commit::Bifurcation { new, .. } | Commit::Distal { new, .. } => *new,
        }
    }
}

/// Geometry and classification record of one vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselRecord {
    pub id: VesselId,
    pub points: Vec<Point>,
    pub radius: f64,
    pub stage: i32,
    pub branching_mode: BranchingMode,
    pub function: VesselFunction,
    pub terminal_type: TerminalType,
    pub reserved_fraction: f64,
    pub flow: f64,
    pub pressure: f64,
}

/// Parent/children record of one vessel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityRecord {
    pub id: VesselId,
    pub parent: Option<VesselId>,
    pub children: Vec<VesselId>,
}

/// Vascular tree owning its element arena and spatial index.
#[derive(Debug, Clone)]
pub struct VascularTree {
    arena: VesselArena,
    index: SpatialGrid,
    params: TreeParameters,
    laws: HydraulicLaws,
    current_stage: i32,
    next_id: VesselId,
    volume: f64,
    stale: bool,
}

impl VascularTree {
    pub fn new(params: TreeParameters, laws: HydraulicLaws) -> DomainResult<Self> {
        if !(params.root_radius > 0.0 && params.root_radius.is_finite()) {
            return Err(DomainError::parameter("root_radius", "must be positive"));
        }
        if !(params.inflow > 0.0 && params.inflow.is_finite()) {
            return Err(DomainError::parameter("inflow", "must be positive"));
        }
        if !params.perfusion_point.is_finite() {
            return Err(DomainError::parameter("perfusion_point", "non-finite coordinate"));
        }
        Ok(Self {
            arena: VesselArena::new(),
            index: SpatialGrid::new(params.cell_size),
            params,
            laws,
            current_stage: 0,
            next_id: 0,
            volume: 0.0,
            stale: false,
        })
    }

    pub fn params(&self) -> &TreeParameters {
        &self.params
    }

    pub fn laws(&self) -> &HydraulicLaws {
        &self.laws
    }

    /// Replaces the hydraulic laws; cached values become stale.
    pub fn set_laws(&mut self, laws: HydraulicLaws) {
        self.laws = laws;
        self.stale = true;
    }

    pub fn current_stage(&self) -> i32 {
        self.current_stage
    }

    pub fn set_current_stage(&mut self, stage: i32) {
        self.current_stage = stage;
    }

    // ------------------------------------------------------------------
    // Read accessors
    // ------------------------------------------------------------------

    pub fn root(&self) -> Option<VesselIndex> {
        self.arena.root()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn vessel(&self, idx: VesselIndex) -> Option<&Vessel> {
        self.arena.get_node(idx).map(|n| &n.vessel)
    }

    pub fn get(&self, idx: VesselIndex) -> DomainResult<&Vessel> {
        self.vessel(idx).ok_or(DomainError::VesselNotFound)
    }

    pub(crate) fn node(&self, idx: VesselIndex) -> DomainResult<&VesselNode> {
        self.arena.get_node(idx).ok_or(DomainError::VesselNotFound)
    }

    pub fn children(&self, idx: VesselIndex) -> &[VesselIndex] {
        self.arena
            .get_node(idx)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, idx: VesselIndex) -> Option<VesselIndex> {
        self.arena.get_node(idx).and_then(|n| n.parent)
    }

    pub fn is_terminal(&self, idx: VesselIndex) -> bool {
        self.arena
            .get_node(idx)
            .map_or(false, |n| n.children.is_empty())
    }

    /// Lazy pre-order traversal of every vessel; call again to restart.
    pub fn vessels(&self) -> impl Iterator<Item = (VesselIndex, &Vessel)> + '_ {
        self.arena.iter().map(|(idx, node)| (idx, &node.vessel))
    }

    /// Lazy pre-order traversal of the leaves.
    pub fn terminals(&self) -> impl Iterator<Item = (VesselIndex, &Vessel)> + '_ {
        self.arena
            .iter()
            .filter(|(_, node)| node.children.is_empty())
            .map(|(idx, node)| (idx, &node.vessel))
    }

    pub fn terminal_count(&self) -> usize {
        self.terminals().count()
    }

    pub fn common_terminal_count(&self) -> usize {
        self.terminals()
            .filter(|(_, v)| v.terminal_type == TerminalType::Common)
            .count()
    }

    pub fn depth(&self) -> usize {
        self.arena.depth()
    }

    /// Total vessel volume, valid after `update_pressure`.
    pub fn volume(&self) -> f64 {
        self.volume
    }

    /// True when a structural change happened since the last hydraulic solve.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    fn allocate_id(&mut self) -> VesselId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert(&mut self, vessel: Vessel, parent: Option<VesselIndex>) -> VesselIndex {
        let points = vessel.points().to_vec();
        let idx = self.arena.insert_node(vessel, parent);
        self.index.insert(idx, &points);
        self.stale = true;
        idx
    }

    /// Creates a straight root vessel from the perfusion point to `distal`.
    pub fn set_root(&mut self, distal: Point, options: &VesselOptions) -> DomainResult<VesselIndex> {
        let proximal = self.params.perfusion_point;
        self.set_root_path(vec![proximal, distal], options)
    }

    /// Creates a (possibly multi-segment) root vessel along `points`, which
    /// must start at the perfusion point.
    #[instrument(level = "debug", skip(self, points, options))]
    pub fn set_root_path(&mut self, points: Vec<Point>, options: &VesselOptions) -> DomainResult<VesselIndex> {
        if self.arena.root().is_some() {
            return Err(DomainError::topology("tree already has a root"));
        }
        if points
            .first()
            .map_or(true, |p| p.distance(&self.params.perfusion_point) > MIN_LENGTH)
        {
            return Err(DomainError::topology("root must start at the perfusion point"));
        }
        validate_options(options)?;
        let vessel = Vessel::new(self.allocate_id(), points, self.current_stage, options)?;
        if vessel.length() <= MIN_LENGTH {
            return Err(GeometryViolation::Degenerate.into());
        }
        let idx = self.insert(vessel, None);
        self.update_pressure();
        debug!("set_root: id={}", self.get(idx)?.id);
        Ok(idx)
    }

    /// Appends a child vessel to `parent`.
    ///
    /// The child must start at the parent's distal point and the parent's
    /// branching mode must admit another child. Cached hydraulics become
    /// stale.
    #[instrument(level = "trace", skip(self, points, options))]
    pub fn add_child(
        &mut self,
        parent: VesselIndex,
        points: Vec<Point>,
        options: &VesselOptions,
    ) -> DomainResult<VesselIndex> {
        let node = self.node(parent)?;
        let mode = node.vessel.branching_mode;
        if node.children.len() >= mode.max_children() {
            return Err(DomainError::topology(format!(
                "{} parent #{} already has {} children",
                mode,
                node.vessel.id,
                node.children.len()
            )));
        }
        let attach = node.vessel.distal();
        if points.first().map_or(true, |p| p.distance(&attach) > MIN_LENGTH) {
            return Err(DomainError::topology("child must start at the parent's distal point"));
        }
        validate_options(options)?;
        let vessel = Vessel::new(self.allocate_id(), points, self.current_stage, options)?;
        if vessel.length() <= MIN_LENGTH {
            return Err(GeometryViolation::Degenerate.into());
        }
        Ok(self.insert(vessel, Some(parent)))
    }

    /// Splits `parent` at `junction` (on polyline segment `segment`) and grows
    /// a new terminal from the junction to `new_point`.
    ///
    /// The distal part of the parent becomes a continuation vessel that keeps
    /// the parent's children, branching mode, stage, function and terminal
    /// data.
    #[instrument(level = "debug", skip(self, options))]
    pub fn bifurcate(
        &mut self,
        parent: VesselIndex,
        segment: usize,
        junction: Point,
        new_point: Point,
        options: &VesselOptions,
    ) -> DomainResult<Commit> {
        let node = self.node(parent)?;
        if !node.vessel.branching_mode.accepts_branches()
            || node.vessel.branching_mode == BranchingMode::DistalBranching
        {
            return Err(DomainError::topology(format!(
                "{} vessel #{} cannot be split",
                node.vessel.branching_mode, node.vessel.id
            )));
        }
        validate_options(options)?;
        let (proximal, distal) = node.vessel.split_points(segment, junction);
        if polyline_length(&proximal) <= MIN_LENGTH
            || polyline_length(&distal) <= MIN_LENGTH
            || junction.distance(&new_point) <= MIN_LENGTH
        {
            return Err(GeometryViolation::Degenerate.into());
        }

        let inserted_joint = proximal.len() + distal.len() == node.vessel.points().len() + 2;
        let old = node.vessel.clone();
        let old_children = node.children.clone();
        let continuation_options = VesselOptions {
            branching_mode: old.branching_mode,
            function: old.function,
            terminal_type: old.terminal_type,
            reserved_fraction: old.reserved_fraction(),
        };
        let mut continuation =
            Vessel::new(self.allocate_id(), distal, old.stage, &continuation_options)?;
        continuation.hydraulics = old.hydraulics.clone();
        let new_vessel = Vessel::new(
            self.allocate_id(),
            vec![junction, new_point],
            self.current_stage,
            options,
        )?;

        // Detach the old children, then rebuild parent -> [continuation, new]
        if let Some(parent_node) = self.arena.get_node_mut(parent) {
            parent_node.children.clear();
            *parent_node.vessel.points_mut() = proximal.clone();
        }
        self.index.insert(parent, &proximal);
        let continuation_idx = self.insert(continuation, Some(parent));
        for child in &old_children {
            if let Some(child_node) = self.arena.get_node_mut(*child) {
                child_node.parent = Some(continuation_idx);
            }
        }
        if let Some(cont_node) = self.arena.get_node_mut(continuation_idx) {
            cont_node.children = old_children;
        }
        let new_idx = self.insert(new_vessel, Some(parent));
        self.update_pressure();
        debug!(
            "bifurcate: parent={} new={} terminals={}",
            old.id,
            self.get(new_idx)?.id,
            self.terminal_count()
        );
        Ok(Commit::Bifurcation {
            parent,
            new: new_idx,
            continuation: continuation_idx,
            inserted_joint,
        })
    }

    /// Grows a new vessel from the distal point of `parent` to `new_point`.
    ///
    /// When the parent was a terminal the new vessel takes over its terminal
    /// role, so the terminal count is unchanged.
    #[instrument(level = "debug", skip(self, options))]
    pub fn attach_distal(
        &mut self,
        parent: VesselIndex,
        new_point: Point,
        options: &VesselOptions,
    ) -> DomainResult<Commit> {
        let node = self.node(parent)?;
        let was_terminal = node.children.is_empty();
        let mut options = options.clone();
        if was_terminal {
            options.terminal_type = node.vessel.terminal_type;
            options.reserved_fraction = node.vessel.reserved_fraction();
        }
        let start = node.vessel.distal();
        let new = self.add_child(parent, vec![start, new_point], &options)?;
        self.update_pressure();
        Ok(Commit::Distal { parent, new })
    }

    /// Detaches `idx` and releases its whole subtree.
    pub fn remove_subtree(&mut self, idx: VesselIndex) -> DomainResult<Vec<Vessel>> {
        self.node(idx)?;
        let released = self.detach(idx);
        self.reclaim_ids(&released);
        self.update_pressure();
        Ok(released)
    }

    /// Releases every subtree below `idx`.
    pub fn remove_children(&mut self, idx: VesselIndex) -> DomainResult<Vec<Vessel>> {
        let children = self.node(idx)?.children.clone();
        let mut released = Vec::new();
        for child in children {
            released.extend(self.detach(child));
        }
        self.reclaim_ids(&released);
        self.update_pressure();
        Ok(released)
    }

    fn detach(&mut self, idx: VesselIndex) -> Vec<Vessel> {
        let released = self.arena.remove_subtree(idx);
        for vessel_idx in self.index.all() {
            if !self.arena.contains(vessel_idx) {
                self.index.remove(vessel_idx);
            }
        }
        released
    }

    fn reclaim_ids(&mut self, released: &[Vessel]) {
        let max = released.iter().map(|v| v.id).max();
        let min = released.iter().map(|v| v.id).min();
        if let (Some(max), Some(min)) = (max, min) {
            if max + 1 == self.next_id && (max - min + 1) as usize == released.len() {
                self.next_id = min;
            }
        }
    }

    /// Undoes a commit, restoring the previous structure and hydraulics.
    #[instrument(level = "debug", skip(self))]
    pub fn rollback(&mut self, commit: &Commit) -> DomainResult<()> {
        match *commit {
            Commit::Distal { new, .. } => {
                self.remove_subtree(new)?;
            }
            Commit::Bifurcation {
                parent,
                new,
                continuation,
                inserted_joint,
            } => {
                self.node(parent)?;
                let new_vessel = self.arena.remove_subtree(new);
                self.index.remove(new);
                let cont = self
                    .arena
                    .remove_node(continuation)
                    .ok_or(DomainError::VesselNotFound)?;
                self.index.remove(continuation);

                let mut merged = self.get(parent)?.points().to_vec();
                merged.pop();
                let skip = usize::from(inserted_joint);
                merged.extend_from_slice(&cont.vessel.points()[skip..]);
                for child in &cont.children {
                    if let Some(child_node) = self.arena.get_node_mut(*child) {
                        child_node.parent = Some(parent);
                    }
                }
                if let Some(parent_node) = self.arena.get_node_mut(parent) {
                    parent_node.children = cont.children.clone();
                    *parent_node.vessel.points_mut() = merged.clone();
                }
                self.index.insert(parent, &merged);
                let mut released = new_vessel;
                released.push(cont.vessel);
                self.reclaim_ids(&released);
                self.update_pressure();
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Hydraulics
    // ------------------------------------------------------------------

    /// Recomputes flows, resistances, radii, pressures and the total volume.
    ///
    /// Post-order pass for flows, reduced resistances and radius ratios,
    /// pre-order pass for radii and pressures. Radius-dependent viscosity
    /// repeats both passes until the ratios settle.
    #[instrument(level = "trace", skip(self))]
    pub fn update_pressure(&mut self) {
        if self.arena.root().is_none() {
            self.volume = 0.0;
            self.stale = false;
            return;
        }
        let preorder = self.arena.preorder_indices();
        let postorder = self.arena.postorder_indices();

        // Levels
        for &idx in &preorder {
            let level = self
                .parent(idx)
                .and_then(|p| self.vessel(p))
                .map_or(0, |p| p.hydraulics.level + 1);
            if let Some(node) = self.arena.get_node_mut(idx) {
                node.vessel.hydraulics.level = level;
            }
        }

        // Terminal counts
        for &idx in &postorder {
            let Some(node) = self.arena.get_node(idx) else { continue };
            let (common, reserved) = if node.children.is_empty() {
                match node.vessel.terminal_type {
                    TerminalType::Common => (1, 0.0),
                    TerminalType::Reserved => (0, node.vessel.hydraulics.reserved_fraction),
                }
            } else {
                node.children
                    .iter()
                    .filter_map(|&c| self.vessel(c))
                    .fold((0, 0.0), |acc, v| {
                        (acc.0 + v.hydraulics.common_terminals, acc.1 + v.hydraulics.reserved_sum)
                    })
            };
            if let Some(node) = self.arena.get_node_mut(idx) {
                node.vessel.hydraulics.common_terminals = common;
                node.vessel.hydraulics.reserved_sum = reserved;
            }
        }
        let term_flow = self.terminal_flow();

        let mut passes = 0;
        loop {
            passes += 1;
            let mut max_beta_change: f64 = 0.0;

            // Resistances, ratios, volume weights
            for &idx in &postorder {
                let Some(node) = self.arena.get_node(idx) else { continue };
                let h = &node.vessel.hydraulics;
                let radius = if h.radius > 0.0 { h.radius } else { self.params.root_radius };
                let viscosity = self.laws.viscosity.viscosity(h.level, radius);
                let length = node.vessel.length();
                let local = local_resistance(viscosity, length);
                let gamma = self.laws.murray_exponent.value(h.level);

                let children: Vec<(VesselIndex, f64, f64, f64)> = node
                    .children
                    .iter()
                    .filter_map(|&c| {
                        self.vessel(c).map(|v| {
                            let h = &v.hydraulics;
                            let flow = self.flow_of(h.common_terminals, h.reserved_sum, term_flow);
                            (c, flow, h.resistance, h.volume_weight)
                        })
                    })
                    .collect();
                let branches: Vec<(f64, f64)> = children.iter().map(|c| (c.1, c.2)).collect();
                let betas = murray_betas(&branches, gamma);
                let resistance = reduced_resistance(
                    local,
                    betas.iter().zip(children.iter()).map(|(b, c)| (*b, c.2)),
                );
                let weight = PI * length
                    + betas
                        .iter()
                        .zip(children.iter())
                        .map(|(b, c)| b * b * c.3)
                        .sum::<f64>();

                for (beta, child) in betas.iter().zip(children.iter()) {
                    if let Some(child_node) = self.arena.get_node_mut(child.0) {
                        let h = &mut child_node.vessel.hydraulics;
                        max_beta_change = max_beta_change.max((h.beta - beta).abs());
                        h.beta = *beta;
                    }
                }
                if let Some(node) = self.arena.get_node_mut(idx) {
                    let h = &mut node.vessel.hydraulics;
                    h.viscosity = viscosity;
                    h.local_resistance = local;
                    h.resistance = resistance;
                    h.volume_weight = weight;
                }
            }

            // Radii, flows, pressures
            for &idx in &preorder {
                let parent_radius = self
                    .parent(idx)
                    .and_then(|p| self.vessel(p))
                    .map(|p| p.hydraulics.radius);
                let root_radius = self.params.root_radius;
                let p_ref = self.params.reference_pressure;
                let Some(flow) = self.vessel(idx).map(|v| {
                    self.flow_of(v.hydraulics.common_terminals, v.hydraulics.reserved_sum, term_flow)
                }) else {
                    continue;
                };
                if let Some(node) = self.arena.get_node_mut(idx) {
                    let h = &mut node.vessel.hydraulics;
                    match parent_radius {
                        Some(r) => h.radius = h.beta * r,
                        None => {
                            h.beta = 1.0;
                            h.radius = root_radius;
                        }
                    }
                    h.flow = flow;
                    h.pressure = h.resistance * flow / h.radius.powi(4) + p_ref;
                }
            }

            if !self.laws.viscosity.depends_on_radius()
                || max_beta_change < BETA_TOLERANCE
                || passes >= MAX_SOLVE_PASSES
            {
                break;
            }
        }

        self.volume = self.vessels().map(|(_, v)| v.volume()).sum();
        self.stale = false;
        trace!(
            "update_pressure: vessels={} volume={:.6e} passes={}",
            self.len(),
            self.volume,
            passes
        );
    }

    /// Flow of one common terminal.
    pub fn terminal_flow(&self) -> f64 {
        let (common, reserved) = self
            .root()
            .and_then(|r| self.vessel(r))
            .map(|v| (v.hydraulics.common_terminals, v.hydraulics.reserved_sum))
            .unwrap_or((0, 0.0));
        self.terminal_flow_for(common, reserved)
    }

    /// Flow of one common terminal for the given root totals.
    pub(crate) fn terminal_flow_for(&self, common: usize, reserved: f64) -> f64 {
        if common == 0 {
            return 0.0;
        }
        (self.params.inflow * (1.0 - reserved)).max(0.0) / common as f64
    }

    /// Flow through a subtree with the given terminal counts.
    pub(crate) fn flow_of(&self, common: usize, reserved: f64, term_flow: f64) -> f64 {
        common as f64 * term_flow + reserved * self.params.inflow
    }

    // ------------------------------------------------------------------
    // Spatial queries
    // ------------------------------------------------------------------

    /// Vessels passing within `radius` of `point`, nearest first.
    pub fn segments_within(&self, point: &Point, radius: f64) -> Vec<(VesselIndex, f64)> {
        let mut hits: Vec<(VesselIndex, f64)> = self
            .index
            .query(&BoundingBox::around(point, radius))
            .into_iter()
            .filter_map(|idx| self.vessel(idx).map(|v| (idx, v.distance_to(point))))
            .filter(|(_, d)| *d <= radius)
            .collect();
        hits.sort_by(|a, b| a.1.total_cmp(&b.1));
        hits
    }

    /// Vessels that may pass within `margin` of the segment `a-b`.
    pub fn segments_near(&self, a: &Point, b: &Point, margin: f64) -> Vec<VesselIndex> {
        let bounds = BoundingBox::new(*a, *b).expanded(margin);
        self.index.query(&bounds)
    }

    /// The `k` vessels nearest to `point` that satisfy `admit`, nearest first.
    pub fn nearest_segments(
        &self,
        point: &Point,
        k: usize,
        admit: impl Fn(VesselIndex, &Vessel) -> bool,
    ) -> Vec<(VesselIndex, f64)> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        let mut radius = self.index.cell_size();
        loop {
            let hits: Vec<(VesselIndex, f64)> = self
                .segments_within(point, radius)
                .into_iter()
                .filter(|(idx, _)| self.vessel(*idx).map_or(false, |v| admit(*idx, v)))
                .collect();
            let covers_everything = self
                .tree_bounds()
                .map_or(true, |b| b.including(point).diagonal() <= radius);
            if hits.len() >= k || covers_everything {
                return hits.into_iter().take(k).collect();
            }
            radius *= 2.0;
        }
    }

    /// Terminals whose distal point lies within `radius` of `point`.
    pub fn terminals_within(&self, point: &Point, radius: f64) -> Vec<VesselIndex> {
        self.index
            .query(&BoundingBox::around(point, radius))
            .into_iter()
            .filter(|idx| self.is_terminal(*idx))
            .filter(|idx| {
                self.vessel(*idx)
                    .map_or(false, |v| v.distal().distance(point) <= radius)
            })
            .collect()
    }

    /// Distance from `point` to the closest vessel.
    pub fn distance_to_tree(&self, point: &Point) -> f64 {
        self.nearest_segments(point, 1, |_, _| true)
            .first()
            .map_or(f64::INFINITY, |(_, d)| *d)
    }

    fn tree_bounds(&self) -> Option<BoundingBox> {
        self.vessels()
            .map(|(_, v)| v.bounding_box())
            .reduce(|a, b| a.including(&b.min).including(&b.max))
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Per-vessel geometry records in pre-order.
    pub fn vessel_data(&self) -> Vec<VesselRecord> {
        self.vessels()
            .map(|(_, v)| VesselRecord {
                id: v.id,
                points: v.points().to_vec(),
                radius: v.radius(),
                stage: v.stage,
                branching_mode: v.branching_mode,
                function: v.function,
                terminal_type: v.terminal_type,
                reserved_fraction: v.reserved_fraction(),
                flow: v.flow(),
                pressure: v.proximal_pressure(),
            })
            .collect()
    }

    /// Per-vessel connectivity records in pre-order.
    pub fn vessel_connectivity(&self) -> Vec<ConnectivityRecord> {
        self.arena
            .iter()
            .map(|(_, node)| ConnectivityRecord {
                id: node.vessel.id,
                parent: node
                    .parent
                    .and_then(|p| self.vessel(p))
                    .map(|p| p.id),
                children: node
                    .children
                    .iter()
                    .filter_map(|c| self.vessel(*c).map(|v| v.id))
                    .collect(),
            })
            .collect()
    }
}

fn polyline_length(points: &[Point]) -> f64 {
    points.windows(2).map(|w| w[0].distance(&w[1])).sum()
}

fn validate_options(options: &VesselOptions) -> DomainResult<()> {
    if options.terminal_type == TerminalType::Reserved
        && !(options.reserved_fraction > 0.0 && options.reserved_fraction < 1.0)
    {
        return Err(DomainError::parameter(
            "reserved_fraction",
            format!("{} not in (0, 1)", options.reserved_fraction),
        ));
    }
    Ok(())
}
