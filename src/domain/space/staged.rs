use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use tracing::info;

use crate::domain::arena::VesselIndex;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::geometry::{BoundingBox, Point};
use crate::domain::space::Domain;
use crate::domain::tree::VascularTree;
use crate::domain::vessel::Vessel;

/// Stage change delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTransition {
    pub previous: usize,
    pub current: usize,
    /// Terminals the new stage must add
    pub terminals: usize,
    /// Terminal count at which the new stage is complete
    pub cumulative_target: usize,
}

/// Listener notified synchronously on every stage transition.
pub trait DomainObserver: Send + Sync {
    fn stage_changed(&self, transition: &StageTransition);
}

/// One growth phase: where to grow and how many terminals to add.
#[derive(Debug, Clone)]
pub struct Stage {
    pub domain: Arc<dyn Domain>,
    pub terminals: usize,
}

impl Stage {
    pub fn new(domain: Arc<dyn Domain>, terminals: usize) -> Self {
        Self { domain, terminals }
    }
}

/// Ordered sequence of stages; acts as the domain of the active stage.
///
/// Mutation is limited to `advance_stage`, which needs `&mut self` and is
/// therefore exclusive with any evaluation borrowing the domain.
pub struct StagedDomain {
    stages: Vec<Stage>,
    current: usize,
    observers: Vec<Arc<dyn DomainObserver>>,
}

impl fmt::Debug for StagedDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagedDomain")
            .field("stages", &self.stages)
            .field("current", &self.current)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl StagedDomain {
    pub fn new(stages: Vec<Stage>) -> DomainResult<Self> {
        if stages.is_empty() {
            return Err(DomainError::parameter("stages", "at least one stage is required"));
        }
        Ok(Self {
            stages,
            current: 0,
            observers: Vec::new(),
        })
    }

    /// Single-stage wrapper around a plain domain.
    pub fn single(domain: Arc<dyn Domain>, terminals: usize) -> Self {
        Self {
            stages: vec![Stage::new(domain, terminals)],
            current: 0,
            observers: Vec::new(),
        }
    }

    pub fn register_observer(&mut self, observer: Arc<dyn DomainObserver>) {
        self.observers.push(observer);
    }

    pub fn current_stage(&self) -> usize {
        self.current
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn is_last_stage(&self) -> bool {
        self.current + 1 >= self.stages.len()
    }

    pub fn active(&self) -> &Arc<dyn Domain> {
        &self.stages[self.current].domain
    }

    /// Terminal count at which stage `stage` is complete.
    pub fn cumulative_target(&self, stage: usize) -> usize {
        self.stages
            .iter()
            .take(stage + 1)
            .map(|s| s.terminals)
            .sum()
    }

    pub fn total_target(&self) -> usize {
        self.cumulative_target(self.stages.len().saturating_sub(1))
    }

    /// Activates the next stage and notifies every observer before
    /// returning. False when no stage remains.
    pub fn advance_stage(&mut self) -> bool {
        if self.is_last_stage() {
            return false;
        }
        let previous = self.current;
        self.current += 1;
        let transition = StageTransition {
            previous,
            current: self.current,
            terminals: self.stages[self.current].terminals,
            cumulative_target: self.cumulative_target(self.current),
        };
        info!(
            "advance_stage: {} -> {} target={}",
            previous, self.current, transition.cumulative_target
        );
        for observer in &self.observers {
            observer.stage_changed(&transition);
        }
        true
    }
}

impl Domain for StagedDomain {
    fn is_inside(&self, p: &Point) -> bool {
        self.active().is_inside(p)
    }

    fn is_segment_inside(&self, a: &Point, b: &Point) -> bool {
        self.active().is_segment_inside(a, b)
    }

    fn random_point(&self, rng: &mut dyn RngCore) -> DomainResult<Point> {
        self.active().random_point(rng)
    }

    fn measure(&self) -> f64 {
        self.active().measure()
    }

    fn bounding_box(&self) -> BoundingBox {
        self.active().bounding_box()
    }

    fn characteristic_length(&self) -> f64 {
        self.active().characteristic_length()
    }

    fn d_lim(&self, n: usize, perfusion_area_factor: f64) -> f64 {
        self.active().d_lim(n, perfusion_area_factor)
    }

    fn local_neighborhood(&self, point: &Point, radius: f64, tree: &VascularTree) -> Vec<VesselIndex> {
        self.active().local_neighborhood(point, radius, tree)
    }

    fn min_bifurcation_angle(&self) -> f64 {
        self.active().min_bifurcation_angle()
    }

    fn min_plane_angle(&self) -> f64 {
        self.active().min_plane_angle()
    }

    fn is_valid_element(&self, vessel: &Vessel) -> bool {
        self.active().is_valid_element(vessel)
    }

    fn points_drawn(&self) -> usize {
        self.stages.iter().map(|s| s.domain.points_drawn()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::space::region::Sphere;
    use crate::domain::space::SimpleDomain;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<StageTransition>>,
    }

    impl DomainObserver for Recorder {
        fn stage_changed(&self, transition: &StageTransition) {
            self.seen.lock().push(*transition);
        }
    }

    fn staged(targets: &[usize]) -> StagedDomain {
        let stages = targets
            .iter()
            .map(|t| {
                let region = Arc::new(Sphere::new(Point::origin(), 1.0).unwrap());
                Stage::new(Arc::new(SimpleDomain::new(region)), *t)
            })
            .collect();
        StagedDomain::new(stages).unwrap()
    }

    #[test]
    fn given_two_stages_when_advancing_then_observer_sees_transition_once() {
        let mut domain = staged(&[10, 20]);
        let recorder = Arc::new(Recorder::default());
        domain.register_observer(recorder.clone());

        assert!(domain.advance_stage());
        assert!(!domain.advance_stage());

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].current, 1);
        assert_eq!(seen[0].cumulative_target, 30);
    }

    #[test]
    fn given_stages_when_summing_targets_then_cumulative() {
        let domain = staged(&[3, 4, 5]);
        assert_eq!(domain.cumulative_target(0), 3);
        assert_eq!(domain.cumulative_target(1), 7);
        assert_eq!(domain.total_target(), 12);
    }

    #[test]
    fn given_no_stages_when_building_then_rejected() {
        assert!(StagedDomain::new(Vec::new()).is_err());
    }
}
