//! Level-dependent constraint functions and hydraulic laws

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, DomainResult};

/// Scalar function of the bifurcation level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstraintFunction {
    Constant { value: f64 },
    /// `values[i]` applies from level `conditions[i]` on; `conditions` ascending.
    PiecewiseConstant { values: Vec<f64>, conditions: Vec<usize> },
}

impl ConstraintFunction {
    pub fn constant(value: f64) -> Self {
        ConstraintFunction::Constant { value }
    }

    pub fn piecewise(values: Vec<f64>, conditions: Vec<usize>) -> DomainResult<Self> {
        if values.is_empty() || values.len() != conditions.len() {
            return Err(DomainError::parameter(
                "piecewise",
                format!(
                    "{} values for {} conditions",
                    values.len(),
                    conditions.len()
                ),
            ));
        }
        if conditions.windows(2).any(|w| w[0] > w[1]) {
            return Err(DomainError::parameter(
                "piecewise",
                "conditions must be ascending",
            ));
        }
        Ok(ConstraintFunction::PiecewiseConstant { values, conditions })
    }

    pub fn value(&self, level: usize) -> f64 {
        match self {
            ConstraintFunction::Constant { value } => *value,
            ConstraintFunction::PiecewiseConstant { values, conditions } => {
                let idx = conditions
                    .iter()
                    .rposition(|&c| c <= level)
                    .unwrap_or(0);
                values.get(idx).copied().unwrap_or(f64::NAN)
            }
        }
    }
}

/// Blood viscosity model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViscosityModel {
    /// Viscosity given per level.
    ByLevel { function: ConstraintFunction },
    /// Fåhræus–Lindqvist in-vivo viscosity; radius in millimetres.
    FahraeusLindqvist,
}

impl ViscosityModel {
    pub fn constant(value: f64) -> Self {
        ViscosityModel::ByLevel {
            function: ConstraintFunction::constant(value),
        }
    }

    pub fn depends_on_radius(&self) -> bool {
        matches!(self, ViscosityModel::FahraeusLindqvist)
    }

    pub fn viscosity(&self, level: usize, radius: f64) -> f64 {
        match self {
            ViscosityModel::ByLevel { function } => function.value(level),
            ViscosityModel::FahraeusLindqvist => fahraeus_lindqvist(radius),
        }
    }
}

fn fahraeus_lindqvist(radius: f64) -> f64 {
    const PLASMA: f64 = 1.1245;
    let d = radius * 2000.0;
    let nu_mix = 6.0 * (-0.085 * d).exp() - 2.44 * (-0.06 * d.powf(0.645)).exp() + 3.2;
    let rel = (d / (d - 1.1)).powi(2);
    PLASMA * (1.0 + (nu_mix - 1.0) * rel) * rel
}

/// Murray exponent, symmetry limit and viscosity in force for a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraulicLaws {
    /// γ in `r_p^γ = Σ r_i^γ`
    pub murray_exponent: ConstraintFunction,
    /// Minimum ratio between the smaller and larger sibling radius
    pub symmetry_limit: ConstraintFunction,
    pub viscosity: ViscosityModel,
}

impl Default for HydraulicLaws {
    fn default() -> Self {
        Self {
            murray_exponent: ConstraintFunction::constant(3.0),
            symmetry_limit: ConstraintFunction::constant(0.0),
            viscosity: ViscosityModel::constant(3.6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1.0)]
    #[case(4, 1.0)]
    #[case(5, 2.0)]
    #[case(9, 2.0)]
    #[case(10, 3.0)]
    #[case(200, 3.0)]
    fn given_piecewise_function_when_evaluating_then_picks_last_matching_condition(
        #[case] level: usize,
        #[case] expected: f64,
    ) {
        let f = ConstraintFunction::piecewise(vec![1.0, 2.0, 3.0], vec![0, 5, 10]).unwrap();
        assert_eq!(f.value(level), expected);
    }

    #[test]
    fn given_mismatched_lengths_when_building_piecewise_then_rejected() {
        assert!(ConstraintFunction::piecewise(vec![1.0], vec![0, 1]).is_err());
        assert!(ConstraintFunction::piecewise(vec![1.0, 2.0], vec![3, 1]).is_err());
    }

    #[test]
    fn given_large_vessel_when_applying_fahraeus_lindqvist_then_approaches_bulk_viscosity() {
        let nu = ViscosityModel::FahraeusLindqvist.viscosity(0, 1.0);
        assert!(nu > 3.0 && nu < 4.5, "bulk viscosity expected, got {nu}");
        let small = ViscosityModel::FahraeusLindqvist.viscosity(0, 0.05);
        assert!(small < nu, "arteriolar viscosity should drop: {small} vs {nu}");
    }
}
