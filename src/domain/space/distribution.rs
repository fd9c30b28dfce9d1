//! Point-sampling distributions

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use rand_distr::Normal;
use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::geometry::{BoundingBox, Point};

/// Closed set of point generators. Samples that fall outside the domain are
/// rejected by the caller.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionGenerator {
    /// Uniform over the domain's bounding box
    #[default]
    Uniform,
    /// Independent normal per axis
    Normal { mean: Point, std_dev: Point },
    Composite(CompositeDistribution),
}

impl DistributionGenerator {
    pub fn normal(mean: Point, std_dev: Point) -> DomainResult<Self> {
        let generator = DistributionGenerator::Normal { mean, std_dev };
        generator.validate()?;
        Ok(generator)
    }

    pub fn validate(&self) -> DomainResult<()> {
        match self {
            DistributionGenerator::Uniform => Ok(()),
            DistributionGenerator::Normal { mean, std_dev } => {
                if !mean.is_finite() {
                    return Err(DomainError::parameter("mean", "non-finite coordinate"));
                }
                for axis in 0..3 {
                    let s = std_dev.component(axis);
                    if !(s >= 0.0 && s.is_finite()) {
                        return Err(DomainError::parameter(
                            "std_dev",
                            format!("{s} is not a valid standard deviation"),
                        ));
                    }
                }
                Ok(())
            }
            DistributionGenerator::Composite(c) => c
                .components
                .iter()
                .try_for_each(|component| component.validate()),
        }
    }

    /// Draws one point; `bounds` is the support of the uniform variant.
    pub fn sample(&self, bounds: &BoundingBox, rng: &mut dyn RngCore) -> Point {
        match self {
            DistributionGenerator::Uniform => Point::new(
                uniform(rng, bounds.min.x, bounds.max.x),
                uniform(rng, bounds.min.y, bounds.max.y),
                uniform(rng, bounds.min.z, bounds.max.z),
            ),
            DistributionGenerator::Normal { mean, std_dev } => Point::new(
                gaussian(rng, mean.x, std_dev.x),
                gaussian(rng, mean.y, std_dev.y),
                gaussian(rng, mean.z, std_dev.z),
            ),
            DistributionGenerator::Composite(c) => {
                let i = c.select_component(rng);
                c.components[i].sample(bounds, rng)
            }
        }
    }
}

fn uniform(rng: &mut dyn RngCore, lo: f64, hi: f64) -> f64 {
    if hi > lo {
        rng.gen_range(lo..hi)
    } else {
        lo
    }
}

fn gaussian(rng: &mut dyn RngCore, mean: f64, std_dev: f64) -> f64 {
    match Normal::new(mean, std_dev) {
        Ok(n) => n.sample(rng),
        Err(_) => mean,
    }
}

/// Weighted choice between sub-generators; weights need not sum to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "CompositeSpec", into = "CompositeSpec")]
pub struct CompositeDistribution {
    components: Vec<DistributionGenerator>,
    weights: Vec<f64>,
    selector: WeightedIndex<f64>,
}

impl CompositeDistribution {
    pub fn new(parts: Vec<(f64, DistributionGenerator)>) -> DomainResult<Self> {
        if parts.is_empty() {
            return Err(DomainError::parameter("components", "composite needs at least one component"));
        }
        let (weights, components): (Vec<f64>, Vec<DistributionGenerator>) = parts.into_iter().unzip();
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(DomainError::parameter("weights", "weights must be finite and non-negative"));
        }
        let selector = WeightedIndex::new(&weights)
            .map_err(|e| DomainError::parameter("weights", e.to_string()))?;
        for component in &components {
            component.validate()?;
        }
        Ok(Self {
            components,
            weights,
            selector,
        })
    }

    /// Weights renormalized to sum to one.
    pub fn probabilities(&self) -> Vec<f64> {
        let total: f64 = self.weights.iter().sum();
        self.weights.iter().map(|w| w / total).collect()
    }

    pub fn components(&self) -> &[DistributionGenerator] {
        &self.components
    }

    pub fn select_component(&self, rng: &mut dyn RngCore) -> usize {
        self.selector.sample(rng)
    }
}

impl PartialEq for CompositeDistribution {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components && self.weights == other.weights
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CompositeSpec {
    components: Vec<WeightedComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WeightedComponent {
    weight: f64,
    generator: DistributionGenerator,
}

impl TryFrom<CompositeSpec> for CompositeDistribution {
    type Error = DomainError;

    fn try_from(spec: CompositeSpec) -> Result<Self, Self::Error> {
        Self::new(
            spec.components
                .into_iter()
                .map(|c| (c.weight, c.generator))
                .collect(),
        )
    }
}

impl From<CompositeDistribution> for CompositeSpec {
    fn from(c: CompositeDistribution) -> Self {
        CompositeSpec {
            components: c
                .weights
                .into_iter()
                .zip(c.components)
                .map(|(weight, generator)| WeightedComponent { weight, generator })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn given_uniform_when_sampling_then_stays_in_bounds() {
        let bounds = BoundingBox::new(Point::new(-1.0, 0.0, 2.0), Point::new(1.0, 3.0, 2.5));
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            let p = DistributionGenerator::Uniform.sample(&bounds, &mut rng);
            assert!(bounds.contains(&p), "{p} outside {bounds:?}");
        }
    }

    #[test]
    fn given_normal_when_sampling_then_mean_is_close() {
        let generator =
            DistributionGenerator::normal(Point::new(5.0, -2.0, 0.0), Point::new(1.0, 1.0, 1.0)).unwrap();
        let bounds = BoundingBox::around(&Point::origin(), 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        let n = 5000;
        let sum = (0..n).fold(Point::origin(), |acc, _| acc + generator.sample(&bounds, &mut rng));
        let mean = sum * (1.0 / n as f64);
        assert!((mean.x - 5.0).abs() < 0.1, "mean.x = {}", mean.x);
        assert!((mean.y + 2.0).abs() < 0.1, "mean.y = {}", mean.y);
    }

    #[test]
    fn given_negative_std_dev_when_building_normal_then_rejected() {
        assert!(DistributionGenerator::normal(Point::origin(), Point::new(1.0, -1.0, 1.0)).is_err());
    }

    #[test]
    fn given_invalid_weights_when_building_composite_then_rejected() {
        assert!(CompositeDistribution::new(vec![]).is_err());
        assert!(CompositeDistribution::new(vec![(0.0, DistributionGenerator::Uniform)]).is_err());
        assert!(CompositeDistribution::new(vec![(-1.0, DistributionGenerator::Uniform)]).is_err());
    }

    #[test]
    fn given_unnormalized_weights_when_asking_probabilities_then_renormalized() {
        let c = CompositeDistribution::new(vec![
            (3.0, DistributionGenerator::Uniform),
            (1.0, DistributionGenerator::Uniform),
        ])
        .unwrap();
        assert_eq!(c.probabilities(), vec![0.75, 0.25]);
    }
}
