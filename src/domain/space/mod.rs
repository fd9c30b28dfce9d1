//! Growth domains: containment, sampling and staged activation

use std::fmt;

use rand::RngCore;

use crate::domain::arena::VesselIndex;
use crate::domain::error::DomainResult;
use crate::domain::geometry::{BoundingBox, Point};
use crate::domain::tree::VascularTree;
use crate::domain::vessel::Vessel;

pub mod distribution;
pub mod region;
pub mod simple;
pub mod staged;

pub use distribution::{CompositeDistribution, DistributionGenerator};
pub use region::{Cuboid, Region, Shape, Sphere};
pub use simple::SimpleDomain;
pub use staged::{DomainObserver, Stage, StageTransition, StagedDomain};

/// Default number of draws before sampling gives up.
pub const DEFAULT_SAMPLING_BUDGET: usize = 10_000;

const SEGMENT_SAMPLES: f64 = 64.0;

/// Spatial region a tree grows in.
///
/// Read operations take `&self` and may run concurrently from the candidate
/// evaluation workers.
pub trait Domain: Send + Sync + fmt::Debug {
    fn is_inside(&self, p: &Point) -> bool;

    /// Sampled containment of the segment `a-b`.
    fn is_segment_inside(&self, a: &Point, b: &Point) -> bool {
        let step = self.characteristic_length() / SEGMENT_SAMPLES;
        let length = a.distance(b);
        let n = if step > 0.0 {
            (length / step).ceil().clamp(1.0, 4.0 * SEGMENT_SAMPLES) as usize
        } else {
            1
        };
        (0..=n).all(|i| self.is_inside(&a.lerp(b, i as f64 / n as f64)))
    }

    /// Rejection-sampled point inside the domain.
    ///
    /// Fails with `DomainSamplingExhausted` once the sampling budget is spent.
    fn random_point(&self, rng: &mut dyn RngCore) -> DomainResult<Point>;

    fn measure(&self) -> f64;

    fn bounding_box(&self) -> BoundingBox;

    /// Cube root of the measure.
    fn characteristic_length(&self) -> f64 {
        self.measure().max(0.0).cbrt()
    }

    /// Nominal acceptance distance for a tree with `n` terminals.
    fn d_lim(&self, n: usize, perfusion_area_factor: f64) -> f64 {
        self.characteristic_length() * (perfusion_area_factor / n.max(1) as f64).cbrt()
    }

    /// Terminals of `tree` within `radius` of `point`.
    fn local_neighborhood(&self, point: &Point, radius: f64, tree: &VascularTree) -> Vec<VesselIndex> {
        let bounds = self.bounding_box();
        tree.terminals_within(point, radius)
            .into_iter()
            .filter(|idx| tree.vessel(*idx).map_or(false, |v| bounds.contains(&v.distal())))
            .collect()
    }

    /// Minimum angle, in radians, between a new branch and the plane
    /// normal to its parent.
    fn min_bifurcation_angle(&self) -> f64;

    /// Minimum angle, in radians, between a new branch and the plane spanned
    /// by the two halves of the split parent.
    fn min_plane_angle(&self) -> f64;

    /// Whether new branches may sprout from `vessel`.
    fn is_valid_element(&self, vessel: &Vessel) -> bool;

    /// Total number of draws so far.
    fn points_drawn(&self) -> usize;
}
