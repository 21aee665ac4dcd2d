//! In-memory recorders fed at every commit.

use serde::{Deserialize, Serialize};

use crate::model::element::NodeMap;

/// Records trial displacements of selected node DOFs at every commit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplacementRecorder {
    pub tag: i32,
    pub nodes: Vec<i32>,
    pub dof: usize,
    /// One row per commit: (time, value per node)
    pub rows: Vec<(f64, Vec<f64>)>,
}

impl DisplacementRecorder {
    pub fn new(tag: i32, nodes: Vec<i32>, dof: usize) -> Self {
        Self {
            tag,
            nodes,
            dof,
            rows: Vec::new(),
        }
    }

    /// Appends one row. Nodes missing from the map (or lacking the DOF) record NaN.
    pub fn record(&mut self, time: f64, nodes: &NodeMap) {
        let values = self
            .nodes
            .iter()
            .map(|tag| {
                nodes
                    .get(tag)
                    .and_then(|n| n.trial_disp().get(self.dof).copied())
                    .unwrap_or(f64::NAN)
            })
            .collect();
        self.rows.push((time, values));
    }

    /// Serializes the recorded rows as JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.rows)
    }
}

impl_movable!(DisplacementRecorder, crate::broker::class_tags::DISP_RECORDER);
