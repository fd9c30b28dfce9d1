//! Vascular elements: classification, geometry and hydraulic state

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::geometry::{point_segment_distance, BoundingBox, Point};

/// Where and how a vessel accepts new branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchingMode {
    NoBranching,
    RigidParent,
    #[default]
    DeformableParent,
    DistalBranching,
    OnlyAtParentHotspots,
}

impl BranchingMode {
    /// Maximum number of children an element in this mode may own.
    pub fn max_children(&self) -> usize {
        match self {
            BranchingMode::NoBranching => 1,
            BranchingMode::DistalBranching => usize::MAX,
            _ => 2,
        }
    }

    pub fn accepts_branches(&self) -> bool {
        !matches!(self, BranchingMode::NoBranching)
    }
}

impl fmt::Display for BranchingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BranchingMode::NoBranching => "no_branching",
            BranchingMode::RigidParent => "rigid_parent",
            BranchingMode::DeformableParent => "deformable_parent",
            BranchingMode::DistalBranching => "distal_branching",
            BranchingMode::OnlyAtParentHotspots => "only_at_parent_hotspots",
        };
        f.write_str(label)
    }
}

impl FromStr for BranchingMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_branching" => Ok(BranchingMode::NoBranching),
            "rigid_parent" => Ok(BranchingMode::RigidParent),
            "deformable_parent" => Ok(BranchingMode::DeformableParent),
            "distal_branching" => Ok(BranchingMode::DistalBranching),
            "only_at_parent_hotspots" => Ok(BranchingMode::OnlyAtParentHotspots),
            other => Err(DomainError::parameter(
                "branching_mode",
                format!("unknown mode '{other}'"),
            )),
        }
    }
}

/// Flow demand class of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalType {
    /// Shares the unreserved inflow evenly with the other common terminals
    #[default]
    Common,
    /// Receives a fixed fraction of the root inflow
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VesselFunction {
    #[default]
    Distribution,
    /// Enters the domain from outside; exempt from proximal containment checks
    Perforator,
    Transport,
}

/// Attributes a new vessel is created with.
#[derive(Debug, Clone, PartialEq)]
pub struct VesselOptions {
    pub branching_mode: BranchingMode,
    pub function: VesselFunction,
    pub terminal_type: TerminalType,
    pub reserved_fraction: f64,
}

impl Default for VesselOptions {
    fn default() -> Self {
        Self {
            branching_mode: BranchingMode::default(),
            function: VesselFunction::default(),
            terminal_type: TerminalType::Common,
            reserved_fraction: 0.0,
        }
    }
}

impl VesselOptions {
    pub fn with_branching_mode(mut self, mode: BranchingMode) -> Self {
        self.branching_mode = mode;
        self
    }

    pub fn with_function(mut self, function: VesselFunction) -> Self {
        self.function = function;
        self
    }

    pub fn reserved(mut self, fraction: f64) -> Self {
        self.terminal_type = TerminalType::Reserved;
        self.reserved_fraction = fraction;
        self
    }
}

/// Vessel identity, unique among live vessels.
pub type VesselId = u64;

/// A vascular element: a single segment or a piecewise polyline with a
/// uniform radius profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Vessel {
    pub id: VesselId,
    pub stage: i32,
    pub branching_mode: BranchingMode,
    pub terminal_type: TerminalType,
    pub function: VesselFunction,
    points: Vec<Point>,
    pub(crate) hydraulics: HydraulicState,
}

/// Cached hydraulic state, refreshed by `VascularTree::update_pressure`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydraulicState {
    pub radius: f64,
    /// Radius ratio to the parent (1 for the root)
    pub beta: f64,
    pub flow: f64,
    /// Proximal pressure
    pub pressure: f64,
    /// Radius-normalized resistance of the subtree rooted here
    pub resistance: f64,
    /// Radius-normalized resistance of this element alone
    pub local_resistance: f64,
    pub viscosity: f64,
    /// Fraction of the root inflow claimed when the terminal is reserved
    pub reserved_fraction: f64,
    /// Depth below the root (root is 0)
    pub level: usize,
    pub(crate) common_terminals: usize,
    pub(crate) reserved_sum: f64,
    /// Subtree volume divided by the squared radius
    pub(crate) volume_weight: f64,
}

impl Vessel {
    pub(crate) fn new(id: VesselId, points: Vec<Point>, stage: i32, options: &VesselOptions) -> DomainResult<Self> {
        if points.len() < 2 {
            return Err(DomainError::topology("a vessel needs at least two points"));
        }
        if points.iter().any(|p| !p.is_finite()) {
            return Err(DomainError::parameter("points", "non-finite coordinate"));
        }
        Ok(Self {
            id,
            stage,
            branching_mode: options.branching_mode,
            terminal_type: options.terminal_type,
            function: options.function,
            points,
            hydraulics: HydraulicState {
                beta: 1.0,
                reserved_fraction: options.reserved_fraction,
                ..HydraulicState::default()
            },
        })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub(crate) fn points_mut(&mut self) -> &mut Vec<Point> {
        &mut self.points
    }

    pub fn proximal(&self) -> Point {
        self.points[0]
    }

    pub fn distal(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    pub fn is_multi_segment(&self) -> bool {
        self.points.len() > 2
    }

    pub fn segments(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.points.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn length(&self) -> f64 {
        self.segments().map(|(a, b)| a.distance(&b)).sum()
    }

    pub fn hydraulics(&self) -> &HydraulicState {
        &self.hydraulics
    }

    pub fn radius(&self) -> f64 {
        self.hydraulics.radius
    }

    pub fn distal_radius(&self) -> f64 {
        self.hydraulics.radius
    }

    pub fn proximal_pressure(&self) -> f64 {
        self.hydraulics.pressure
    }

    pub fn flow(&self) -> f64 {
        self.hydraulics.flow
    }

    pub fn level(&self) -> usize {
        self.hydraulics.level
    }

    pub fn reserved_fraction(&self) -> f64 {
        self.hydraulics.reserved_fraction
    }

    /// Volume of this element alone, `π·r²·L`.
    pub fn volume(&self) -> f64 {
        PI * self.hydraulics.radius.powi(2) * self.length()
    }

    pub fn distance_to(&self, p: &Point) -> f64 {
        self.segments()
            .map(|(a, b)| point_segment_distance(&a, &b, p))
            .fold(f64::INFINITY, f64::min)
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
            .unwrap_or_else(|| BoundingBox::around(&self.proximal(), 0.0))
    }

    /// Interior polyline joints; the midpoint for a straight vessel.
    pub fn hotspots(&self) -> Vec<Point> {
        if self.is_multi_segment() {
            self.points[1..self.points.len() - 1].to_vec()
        } else {
            vec![self.proximal().lerp(&self.distal(), 0.5)]
        }
    }

    /// Splits the polyline at `junction`, which lies on the segment with
    /// index `segment`: returns the proximal part (ending at the junction) and
    /// the distal part (starting there).
    pub(crate) fn split_points(&self, segment: usize, junction: Point) -> (Vec<Point>, Vec<Point>) {
        const SAME: f64 = 1e-12;
        let segment = segment.min(self.points.len() - 2);
        let mut proximal: Vec<Point> = self.points[..=segment].to_vec();
        if proximal.last().map_or(true, |p| p.distance(&junction) > SAME) {
            proximal.push(junction);
        }
        let mut distal = vec![junction];
        let rest = &self.points[segment + 1..];
        let skip = usize::from(rest.first().map_or(false, |p| p.distance(&junction) <= SAME));
        distal.extend_from_slice(&rest[skip..]);
        (proximal, distal)
    }

    /// Index of the polyline segment closest to `p`.
    pub(crate) fn closest_segment(&self, p: &Point) -> usize {
        self.segments()
            .enumerate()
            .map(|(i, (a, b))| (i, point_segment_distance(&a, &b, p)))
            .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
            .0
    }
}

impl fmt::Display for Vessel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} -> {} r={:.4} q={:.4e} p={:.2}",
            self.id,
            self.proximal(),
            self.distal(),
            self.hydraulics.radius,
            self.hydraulics.flow,
            self.hydraulics.pressure
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polyline() -> Vessel {
        Vessel::new(
            1,
            vec![
                Point::new(0.0, 0.0, 0.0),
                Point::new(1.0, 0.0, 0.0),
                Point::new(1.0, 2.0, 0.0),
            ],
            0,
            &VesselOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn given_polyline_when_measuring_length_then_sums_segments() {
        assert!((polyline().length() - 3.0).abs() < 1e-12);
        assert!(polyline().is_multi_segment());
    }

    #[test]
    fn given_polyline_when_splitting_then_parts_share_junction() {
        let v = polyline();
        let junction = Point::new(1.0, 1.0, 0.0);
        let (prox, dist) = v.split_points(v.closest_segment(&junction), junction);
        assert_eq!(prox, vec![Point::origin(), Point::new(1.0, 0.0, 0.0), junction]);
        assert_eq!(dist, vec![junction, Point::new(1.0, 2.0, 0.0)]);
    }

    #[test]
    fn given_single_point_when_creating_vessel_then_rejected() {
        let err = Vessel::new(1, vec![Point::origin()], 0, &VesselOptions::default());
        assert!(matches!(err, Err(DomainError::InvalidTopology { .. })));
    }

    #[test]
    fn given_straight_vessel_when_asking_hotspots_then_returns_midpoint() {
        let v = Vessel::new(
            1,
            vec![Point::origin(), Point::new(2.0, 0.0, 0.0)],
            0,
            &VesselOptions::default(),
        )
        .unwrap();
        assert_eq!(v.hotspots(), vec![Point::new(1.0, 0.0, 0.0)]);
    }

    #[test]
    fn given_mode_names_when_parsing_then_round_trip_display() {
        for mode in [
            BranchingMode::NoBranching,
            BranchingMode::RigidParent,
            BranchingMode::DeformableParent,
            BranchingMode::DistalBranching,
            BranchingMode::OnlyAtParentHotspots,
        ] {
            assert_eq!(mode.to_string().parse::<BranchingMode>().unwrap(), mode);
        }
    }
}
