//! Candidate scoring

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, DomainResult};

/// Quantities of one trial placement a cost estimator may score.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CandidateMetrics {
    /// Tree volume after the trial minus the volume before
    pub volume_delta: f64,
    /// Radius of the parent before the trial
    pub parent_radius: f64,
    /// Distance from the new terminal to the parent segment
    pub distance_to_parent: f64,
    /// Change of the tree-wide power cost; zero unless the estimator has power terms
    pub power_delta: f64,
}

/// One `alpha * length^l * radius^r` term of a per-vessel power cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerTerm {
    #[serde(default = "unit_alpha")]
    pub alpha: f64,
    pub length_exponent: f64,
    pub radius_exponent: f64,
}

fn unit_alpha() -> f64 {
    1.0
}

impl PowerTerm {
    pub fn new(alpha: f64, length_exponent: f64, radius_exponent: f64) -> Self {
        Self {
            alpha,
            length_exponent,
            radius_exponent,
        }
    }

    pub fn vessel_cost(&self, length: f64, radius: f64) -> f64 {
        self.alpha * length.powf(self.length_exponent) * radius.powf(self.radius_exponent)
    }
}

/// Closed set of cost functions. Lower is better; values are only
/// comparable within one iteration's candidate set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CostEstimator {
    /// Added vessel volume
    #[default]
    Volumetric,
    /// Volume plus proteolytic and diffusion penalties
    Sprouting {
        volume_factor: f64,
        proteolytic_factor: f64,
        diffusion_factor: f64,
    },
    /// Sprouting cost with every term made dimensionless
    AdimSprouting {
        volume_factor: f64,
        proteolytic_factor: f64,
        diffusion_factor: f64,
        volume_ref: f64,
        radius_ref: f64,
    },
    /// Tree-wide sum of `length^l * radius^r` with integer exponents
    Power { length_exponent: u32, radius_exponent: u32 },
    /// Tree-wide sum of `length^l * radius^r` with real exponents
    DoublePower { length_exponent: f64, radius_exponent: f64 },
    /// Tree-wide sum of weighted power terms
    LinearCombination { terms: Vec<PowerTerm> },
}

impl CostEstimator {
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            CostEstimator::AdimSprouting {
                volume_ref,
                radius_ref,
                ..
            } => {
                if !(*volume_ref > 0.0) {
                    return Err(DomainError::parameter("volume_ref", "must be positive"));
                }
                if !(*radius_ref > 0.0) {
                    return Err(DomainError::parameter("radius_ref", "must be positive"));
                }
            }
            CostEstimator::LinearCombination { terms } if terms.is_empty() => {
                return Err(DomainError::parameter("terms", "at least one term required"));
            }
            _ => {}
        }
        if let Some(terms) = self.power_terms() {
            let finite = terms
                .iter()
                .all(|t| t.alpha.is_finite() && t.length_exponent.is_finite() && t.radius_exponent.is_finite());
            if !finite {
                return Err(DomainError::parameter("terms", "coefficients and exponents must be finite"));
            }
        }
        Ok(())
    }

    /// Per-vessel terms of a tree-wide power cost; `None` for estimators
    /// scoring only the trial's local metrics.
    pub fn power_terms(&self) -> Option<Vec<PowerTerm>> {
        match self {
            CostEstimator::Power {
                length_exponent,
                radius_exponent,
            } => Some(vec![PowerTerm::new(1.0, *length_exponent as f64, *radius_exponent as f64)]),
            CostEstimator::DoublePower {
                length_exponent,
                radius_exponent,
            } => Some(vec![PowerTerm::new(1.0, *length_exponent, *radius_exponent)]),
            CostEstimator::LinearCombination { terms } => Some(terms.clone()),
            _ => None,
        }
    }

    pub fn evaluate(&self, m: &CandidateMetrics) -> f64 {
        match *self {
            CostEstimator::Volumetric => m.volume_delta,
            CostEstimator::Sprouting {
                volume_factor,
                proteolytic_factor,
                diffusion_factor,
            } => {
                volume_factor * m.volume_delta
                    + proteolytic_factor * m.parent_radius
                    + diffusion_factor * m.distance_to_parent.powi(2)
            }
            CostEstimator::AdimSprouting {
                volume_factor,
                proteolytic_factor,
                diffusion_factor,
                volume_ref,
                radius_ref,
            } => {
                let length_ref = (3.0 * volume_ref / (4.0 * PI)).cbrt();
                volume_factor * m.volume_delta / volume_ref
                    + proteolytic_factor * m.parent_radius / radius_ref
                    + diffusion_factor * (m.distance_to_parent / length_ref).powi(2)
            }
            CostEstimator::Power { .. }
            | CostEstimator::DoublePower { .. }
            | CostEstimator::LinearCombination { .. } => m.power_delta,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CostEstimator::Volumetric => "volumetric",
            CostEstimator::Sprouting { .. } => "sprouting",
            CostEstimator::AdimSprouting { .. } => "adim_sprouting",
            CostEstimator::Power { .. } => "power",
            CostEstimator::DoublePower { .. } => "double_power",
            CostEstimator::LinearCombination { .. } => "linear_combination",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const METRICS: CandidateMetrics = CandidateMetrics {
        volume_delta: 2.0,
        parent_radius: 0.5,
        distance_to_parent: 3.0,
        power_delta: 7.0,
    };

    #[rstest]
    #[case(CostEstimator::Volumetric, 2.0)]
    #[case(CostEstimator::Sprouting { volume_factor: 1.0, proteolytic_factor: 2.0, diffusion_factor: 0.5 }, 2.0 + 1.0 + 4.5)]
    #[case(CostEstimator::Sprouting { volume_factor: 0.0, proteolytic_factor: 0.0, diffusion_factor: 1.0 }, 9.0)]
    fn given_metrics_when_evaluating_then_matches_formula(#[case] cost: CostEstimator, #[case] expected: f64) {
        assert!((cost.evaluate(&METRICS) - expected).abs() < 1e-12);
    }

    #[test]
    fn given_unit_sphere_reference_when_adim_then_terms_normalized() {
        let v_ref = 4.0 * PI / 3.0;
        let cost = CostEstimator::AdimSprouting {
            volume_factor: 1.0,
            proteolytic_factor: 1.0,
            diffusion_factor: 1.0,
            volume_ref: v_ref,
            radius_ref: 0.25,
        };
        let expected = 2.0 / v_ref + 2.0 + 9.0;
        assert!((cost.evaluate(&METRICS) - expected).abs() < 1e-9);
    }

    #[test]
    fn given_zero_reference_when_validating_then_rejected() {
        let cost = CostEstimator::AdimSprouting {
            volume_factor: 1.0,
            proteolytic_factor: 1.0,
            diffusion_factor: 1.0,
            volume_ref: 0.0,
            radius_ref: 1.0,
        };
        assert!(cost.validate().is_err());
        assert!(CostEstimator::Volumetric.validate().is_ok());
    }

    #[rstest]
    #[case(CostEstimator::Power { length_exponent: 1, radius_exponent: 2 })]
    #[case(CostEstimator::DoublePower { length_exponent: 1.0, radius_exponent: 2.5 })]
    #[case(CostEstimator::LinearCombination { terms: vec![PowerTerm::new(2.0, 1.0, 2.0)] })]
    fn given_power_estimator_when_evaluating_then_scores_power_delta(#[case] cost: CostEstimator) {
        assert!(cost.power_terms().is_some());
        assert!(cost.validate().is_ok());
        assert_eq!(cost.evaluate(&METRICS), 7.0);
    }

    #[test]
    fn given_power_term_when_costing_vessel_then_alpha_length_radius_product() {
        let term = PowerTerm::new(3.0, 2.0, 4.0);
        assert!((term.vessel_cost(2.0, 0.5) - 3.0 * 4.0 * 0.0625).abs() < 1e-12);
        assert!(CostEstimator::Volumetric.power_terms().is_none());
    }

    #[test]
    fn given_empty_or_non_finite_terms_when_validating_then_rejected() {
        let empty = CostEstimator::LinearCombination { terms: Vec::new() };
        assert!(empty.validate().is_err());
        let nan = CostEstimator::DoublePower {
            length_exponent: f64::NAN,
            radius_exponent: 2.0,
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn given_toml_table_when_deserializing_linear_combination_then_alpha_defaults_to_one() {
        let cost: CostEstimator = toml::from_str(
            r#"
            kind = "linear_combination"
            terms = [{ length_exponent = 1.0, radius_exponent = 2.0 }, { alpha = 0.5, length_exponent = 1.0, radius_exponent = 0.0 }]
            "#,
        )
        .unwrap();
        let terms = cost.power_terms().unwrap();
        assert_eq!(terms[0].alpha, 1.0);
        assert_eq!(terms[1], PowerTerm::new(0.5, 1.0, 0.0));
    }
}
