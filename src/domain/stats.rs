//! Attribute extraction and aggregation over filtered vessels

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;
use crate::domain::filter::VesselFilter;
use crate::domain::tree::VascularTree;
use crate::domain::vessel::Vessel;

/// Numeric vessel attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VesselAttribute {
    Diameter,
    Radius,
    Flow,
    Pressure,
    Resistance,
    Length,
    Level,
    Beta,
    Volume,
    Stage,
}

impl VesselAttribute {
    pub const ALL: [VesselAttribute; 10] = [
        VesselAttribute::Diameter,
        VesselAttribute::Radius,
        VesselAttribute::Flow,
        VesselAttribute::Pressure,
        VesselAttribute::Resistance,
        VesselAttribute::Length,
        VesselAttribute::Level,
        VesselAttribute::Beta,
        VesselAttribute::Volume,
        VesselAttribute::Stage,
    ];

    pub fn extract(&self, vessel: &Vessel) -> f64 {
        let h = vessel.hydraulics();
        match self {
            VesselAttribute::Diameter => 2.0 * h.radius,
            VesselAttribute::Radius => h.radius,
            VesselAttribute::Flow => h.flow,
            VesselAttribute::Pressure => h.pressure,
            VesselAttribute::Resistance => h.resistance,
            VesselAttribute::Length => vessel.length(),
            VesselAttribute::Level => h.level as f64,
            VesselAttribute::Beta => h.beta,
            VesselAttribute::Volume => vessel.volume(),
            VesselAttribute::Stage => vessel.stage as f64,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VesselAttribute::Diameter => "diameter",
            VesselAttribute::Radius => "radius",
            VesselAttribute::Flow => "flow",
            VesselAttribute::Pressure => "pressure",
            VesselAttribute::Resistance => "resistance",
            VesselAttribute::Length => "length",
            VesselAttribute::Level => "level",
            VesselAttribute::Beta => "beta",
            VesselAttribute::Volume => "volume",
            VesselAttribute::Stage => "stage",
        }
    }
}

impl fmt::Display for VesselAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VesselAttribute {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VesselAttribute::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::parameter("attribute", format!("unknown attribute '{s}'")))
    }
}

/// Aggregation over a sequence of values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatManipulator {
    Mean,
    /// Nearest-rank percentile, `0..=100`
    Percentile(f64),
    /// Population standard deviation
    StdDev,
}

impl StatManipulator {
    /// None for an empty sequence.
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        match *self {
            StatManipulator::Mean => Some(mean),
            StatManipulator::Percentile(p) => {
                let sorted: Vec<f64> = values.iter().copied().sorted_by(|a, b| a.total_cmp(b)).collect();
                let rank = ((p.clamp(0.0, 100.0) / 100.0) * n).ceil() as usize;
                Some(sorted[rank.clamp(1, sorted.len()) - 1])
            }
            StatManipulator::StdDev => {
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                Some(var.sqrt())
            }
        }
    }
}

/// Filtered, read-only statistics over a tree.
#[derive(Debug, Default)]
pub struct TreeStatsManager {
    filter: Option<Box<dyn VesselFilter>>,
}

impl TreeStatsManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: impl VesselFilter + 'static) -> Self {
        Self {
            filter: Some(Box::new(filter)),
        }
    }

    fn selected<'t>(&self, tree: &'t VascularTree) -> Vec<&'t Vessel> {
        match &self.filter {
            Some(filter) => filter.apply(tree).into_iter().map(|(_, v)| v).collect(),
            None => tree.vessels().map(|(_, v)| v).collect(),
        }
    }

    pub fn collect(&self, tree: &VascularTree, attribute: VesselAttribute) -> Vec<f64> {
        self.selected(tree)
            .into_iter()
            .map(|v| attribute.extract(v))
            .collect()
    }

    pub fn compute(&self, tree: &VascularTree, attribute: VesselAttribute, manipulator: StatManipulator) -> Option<f64> {
        manipulator.apply(&self.collect(tree, attribute))
    }

    /// Mean of `attribute` per bifurcation level.
    pub fn mean_per_level(&self, tree: &VascularTree, attribute: VesselAttribute) -> BTreeMap<usize, f64> {
        self.selected(tree)
            .into_iter()
            .map(|v| (v.level(), attribute.extract(v)))
            .into_group_map()
            .into_iter()
            .filter_map(|(level, values)| StatManipulator::Mean.apply(&values).map(|m| (level, m)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(StatManipulator::Mean, 2.5)]
    #[case(StatManipulator::Percentile(50.0), 2.0)]
    #[case(StatManipulator::Percentile(75.0), 3.0)]
    #[case(StatManipulator::Percentile(100.0), 4.0)]
    #[case(StatManipulator::Percentile(0.0), 1.0)]
    fn given_values_when_aggregating_then_expected(#[case] manipulator: StatManipulator, #[case] expected: f64) {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(manipulator.apply(&values), Some(expected));
    }

    #[test]
    fn given_values_when_std_dev_then_population_formula() {
        let sd = StatManipulator::StdDev
            .apply(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0])
            .unwrap();
        assert!((sd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn given_empty_sequence_when_aggregating_then_none() {
        assert_eq!(StatManipulator::Mean.apply(&[]), None);
    }

    #[test]
    fn given_attribute_names_when_parsing_then_round_trip() {
        for attribute in VesselAttribute::ALL {
            assert_eq!(attribute.to_string().parse::<VesselAttribute>().unwrap(), attribute);
        }
        assert!("girth".parse::<VesselAttribute>().is_err());
    }
}
