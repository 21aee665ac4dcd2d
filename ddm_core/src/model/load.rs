//! Loads, time series and load patterns.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::constraint::SpConstraint;

/// Scales a pattern as a function of the (pseudo) time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimeSeries {
    /// `factor * time`
    Linear { factor: f64 },
    /// `factor`, whatever the time
    Constant { factor: f64 },
}

impl Default for TimeSeries {
    fn default() -> Self {
        TimeSeries::Linear { factor: 1.0 }
    }
}

impl TimeSeries {
    pub fn factor(&self, time: f64) -> f64 {
        match *self {
            TimeSeries::Linear { factor } => factor * time,
            TimeSeries::Constant { factor } => factor,
        }
    }
}

/// Load applied at a node (one value per node DOF).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodalLoad {
    pub tag: i32,
    pub node: i32,
    pub values: Vec<f64>,
}

impl NodalLoad {
    pub fn new(tag: i32, node: i32, values: Vec<f64>) -> Self {
        Self { tag, node, values }
    }
}

impl_movable!(NodalLoad, crate::broker::class_tags::NODAL_LOAD);

/// Equivalent nodal forces applied through an element (element-local order).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementalLoad {
    pub tag: i32,
    pub element: i32,
    pub values: Vec<f64>,
}

impl ElementalLoad {
    pub fn new(tag: i32, element: i32, values: Vec<f64>) -> Self {
        Self { tag, element, values }
    }
}

impl_movable!(ElementalLoad, crate::broker::class_tags::ELEMENTAL_LOAD);

/// A set of loads and imposed displacements sharing one time series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadPattern {
    pub tag: i32,
    pub series: TimeSeries,
    pub nodal_loads: BTreeMap<i32, NodalLoad>,
    pub elemental_loads: BTreeMap<i32, ElementalLoad>,
    pub sp_constraints: BTreeMap<i32, SpConstraint>,
    /// Factor of the last `apply`, frozen by `set_load_constant`
    current_factor: f64,
}

impl LoadPattern {
    pub fn new(tag: i32, series: TimeSeries) -> Self {
        Self {
            tag,
            series,
            ..Default::default()
        }
    }

    pub fn with_nodal_load(mut self, load: NodalLoad) -> Self {
        self.nodal_loads.insert(load.tag, load);
        self
    }

    pub fn with_elemental_load(mut self, load: ElementalLoad) -> Self {
        self.elemental_loads.insert(load.tag, load);
        self
    }

    pub fn with_sp_constraint(mut self, sp: SpConstraint) -> Self {
        self.sp_constraints.insert(sp.tag, sp);
        self
    }

    /// Computes and remembers the factor at `time`.
    pub fn update_factor(&mut self, time: f64) -> f64 {
        self.current_factor = self.series.factor(time);
        self.current_factor
    }

    pub fn current_factor(&self) -> f64 {
        self.current_factor
    }

    /// Freezes the pattern at its current factor.
    pub fn set_load_constant(&mut self) {
        self.series = TimeSeries::Constant {
            factor: self.current_factor,
        };
    }

    /// Copy of the pattern with no loads, keeping tag and series.
    pub fn empty_like(&self) -> Self {
        Self {
            tag: self.tag,
            series: self.series,
            current_factor: self.current_factor,
            ..Default::default()
        }
    }
}

impl_movable!(LoadPattern, crate::broker::class_tags::LOAD_PATTERN);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_series_then_constant() {
        let mut pattern = LoadPattern::new(1, TimeSeries::Linear { factor: 2.0 });
        assert_eq!(pattern.update_factor(0.5), 1.0);

        pattern.set_load_constant();
        assert_eq!(pattern.update_factor(10.0), 1.0);
        assert_eq!(pattern.series, TimeSeries::Constant { factor: 1.0 });
    }
}
