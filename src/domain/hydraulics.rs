//! Poiseuille resistances and Murray radius ratios

use std::f64::consts::PI;

/// Radius-normalized Poiseuille resistance `8·ν·L/π`.
pub fn local_resistance(viscosity: f64, length: f64) -> f64 {
    8.0 * viscosity * length / PI
}

/// Radius ratios of sibling branches given `(flow, reduced resistance)` per
/// branch, such that `Σ β_i^γ = 1` and `r_i^4 ∝ Q_i·R*_i`.
///
/// A single branch keeps the parent radius.
pub fn murray_betas(branches: &[(f64, f64)], gamma: f64) -> Vec<f64> {
    match branches.len() {
        0 => Vec::new(),
        1 => vec![1.0],
        n => {
            let weights: Vec<f64> = branches
                .iter()
                .map(|(q, r)| (q * r).max(0.0).powf(0.25))
                .collect();
            let norm = weights.iter().map(|w| w.powf(gamma)).sum::<f64>().powf(1.0 / gamma);
            if norm > 0.0 && norm.is_finite() {
                weights.into_iter().map(|w| w / norm).collect()
            } else {
                vec![(n as f64).powf(-1.0 / gamma); n]
            }
        }
    }
}

/// Reduced resistance of a vessel from its own resistance and its children's
/// `(β, R*)` pairs: `R_l + 1/Σ(β⁴/R*)`.
pub fn reduced_resistance(local: f64, children: impl IntoIterator<Item = (f64, f64)>) -> f64 {
    let conductance: f64 = children
        .into_iter()
        .map(|(beta, r)| if r > 0.0 { beta.powi(4) / r } else { f64::INFINITY })
        .sum();
    if conductance > 0.0 {
        local + 1.0 / conductance
    } else {
        local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(vec![(1.0, 1.0), (1.0, 1.0)])]
    #[case(vec![(2.0, 0.5), (1.0, 3.0)])]
    #[case(vec![(1.0, 1.0), (4.0, 2.0), (0.5, 7.0)])]
    fn given_branches_when_computing_betas_then_murray_sum_is_one(#[case] branches: Vec<(f64, f64)>) {
        let betas = murray_betas(&branches, 3.0);
        let sum: f64 = betas.iter().map(|b| b.powi(3)).sum();
        assert!((sum - 1.0).abs() < 1e-12, "Σβ³ = {sum}");
    }

    #[test]
    fn given_symmetric_branches_when_computing_betas_then_equal_split() {
        let betas = murray_betas(&[(1.0, 2.0), (1.0, 2.0)], 3.0);
        assert!((betas[0] - betas[1]).abs() < 1e-15);
        assert!((betas[0] - 2f64.powf(-1.0 / 3.0)).abs() < 1e-12);
    }

    #[test]
    fn given_single_branch_when_computing_betas_then_keeps_radius() {
        assert_eq!(murray_betas(&[(3.0, 5.0)], 3.0), vec![1.0]);
    }

    #[test]
    fn given_parallel_children_when_reducing_then_adds_conductances() {
        let r = reduced_resistance(1.0, [(1.0, 2.0), (1.0, 2.0)]);
        assert!((r - 2.0).abs() < 1e-12);
    }
}
