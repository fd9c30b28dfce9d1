use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, instrument};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::geometry::{BoundingBox, Point};
use crate::domain::space::distribution::DistributionGenerator;
use crate::domain::space::region::Region;
use crate::domain::space::{Domain, DEFAULT_SAMPLING_BUDGET};
use crate::domain::vessel::Vessel;

/// Region with exclusions, a sampling distribution and growth rules.
pub struct SimpleDomain {
    region: Arc<dyn Region>,
    exclusions: Vec<Arc<dyn Region>>,
    distribution: DistributionGenerator,
    sampling_budget: usize,
    min_bifurcation_angle: f64,
    min_plane_angle: f64,
    /// Stages whose vessels may sprout; all when None
    growing_stages: Option<Vec<i32>>,
    drawn: AtomicUsize,
}

impl fmt::Debug for SimpleDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleDomain")
            .field("region", &self.region)
            .field("exclusions", &self.exclusions.len())
            .field("distribution", &self.distribution)
            .field("sampling_budget", &self.sampling_budget)
            .field("growing_stages", &self.growing_stages)
            .finish()
    }
}

impl SimpleDomain {
    pub fn new(region: Arc<dyn Region>) -> Self {
        Self {
            region,
            exclusions: Vec::new(),
            distribution: DistributionGenerator::Uniform,
            sampling_budget: DEFAULT_SAMPLING_BUDGET,
            min_bifurcation_angle: 0.0,
            min_plane_angle: 0.0,
            growing_stages: None,
            drawn: AtomicUsize::new(0),
        }
    }

    pub fn with_exclusion(mut self, region: Arc<dyn Region>) -> Self {
        self.exclusions.push(region);
        self
    }

    pub fn with_distribution(mut self, distribution: DistributionGenerator) -> DomainResult<Self> {
        distribution.validate()?;
        self.distribution = distribution;
        Ok(self)
    }

    pub fn with_sampling_budget(mut self, budget: usize) -> Self {
        self.sampling_budget = budget.max(1);
        self
    }

    pub fn with_min_bifurcation_angle(mut self, angle: f64) -> DomainResult<Self> {
        if !(0.0..std::f64::consts::FRAC_PI_2).contains(&angle) {
            return Err(DomainError::parameter(
                "min_bifurcation_angle",
                format!("{angle} not in [0, π/2)"),
            ));
        }
        self.min_bifurcation_angle = angle;
        Ok(self)
    }

    pub fn with_min_plane_angle(mut self, angle: f64) -> DomainResult<Self> {
        if !(0.0..=std::f64::consts::FRAC_PI_2).contains(&angle) {
            return Err(DomainError::parameter(
                "min_plane_angle",
                format!("{angle} not in [0, π/2]"),
            ));
        }
        self.min_plane_angle = angle;
        Ok(self)
    }

    pub fn with_growing_stages(mut self, stages: Vec<i32>) -> Self {
        self.growing_stages = Some(stages);
        self
    }

    pub fn distribution(&self) -> &DistributionGenerator {
        &self.distribution
    }

    fn in_exclusion(&self, p: &Point) -> bool {
        self.exclusions.iter().any(|e| e.contains(p))
    }
}

impl Domain for SimpleDomain {
    fn is_inside(&self, p: &Point) -> bool {
        self.region.contains(p) && !self.in_exclusion(p)
    }

    #[instrument(level = "trace", skip(self, rng))]
    fn random_point(&self, rng: &mut dyn RngCore) -> DomainResult<Point> {
        let bounds = self.region.bounding_box();
        if self.region.measure() > 0.0 {
            for _ in 0..self.sampling_budget {
                self.drawn.fetch_add(1, Ordering::Relaxed);
                let p = self.distribution.sample(&bounds, rng);
                if self.is_inside(&p) {
                    return Ok(p);
                }
            }
        }
        debug!("random_point: exhausted budget={}", self.sampling_budget);
        Err(DomainError::DomainSamplingExhausted {
            attempts: self.sampling_budget,
        })
    }

    fn measure(&self) -> f64 {
        self.region.measure()
    }

    fn bounding_box(&self) -> BoundingBox {
        self.region.bounding_box()
    }

    fn min_bifurcation_angle(&self) -> f64 {
        self.min_bifurcation_angle
    }

    fn min_plane_angle(&self) -> f64 {
        self.min_plane_angle
    }

    fn is_valid_element(&self, vessel: &Vessel) -> bool {
        self.growing_stages
            .as_ref()
            .map_or(true, |stages| stages.contains(&vessel.stage))
    }

    fn points_drawn(&self) -> usize {
        self.drawn.load(Ordering::Relaxed)
    }
}
