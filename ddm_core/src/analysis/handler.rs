//! Constraint handling: elimination for SP constraints, penalty for equal DOFs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::model::{
    AnalysisModel, DofGroup, PenaltyFe, CONSTRAINED, UNNUMBERED_EXTERNAL, UNNUMBERED_INTERNAL,
};
use crate::error::{DdError, DdResult};
use crate::model::Domain;

/// Builds DOF groups and marks each DOF as constrained, internal or external.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstraintHandler {
    /// Penalty factor for equal-DOF constraints
    pub alpha: f64,
}

impl Default for ConstraintHandler {
    fn default() -> Self {
        Self { alpha: 1e8 }
    }
}

impl ConstraintHandler {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Populates `model` from `domain` and returns the number of external
    /// (interface) equations.
    ///
    /// DOFs of external nodes are marked external unless an SP constraint
    /// eliminates them.
    pub fn handle(&self, domain: &Domain, model: &mut AnalysisModel) -> DdResult<usize> {
        model.clear();

        for node in domain.nodes().values() {
            let external = domain.is_external(node.tag);
            let marker = if external {
                UNNUMBERED_EXTERNAL
            } else {
                UNNUMBERED_INTERNAL
            };
            model.dof_groups.insert(
                node.tag,
                DofGroup {
                    node: node.tag,
                    external,
                    ids: vec![marker; node.ndf()],
                },
            );
        }

        for sp in domain.all_sp_constraints() {
            let group = model
                .dof_groups
                .get_mut(&sp.node)
                .ok_or(DdError::UnknownNode(sp.node))?;
            let id = group.ids.get_mut(sp.dof).ok_or_else(|| {
                DdError::invalid_model(format!("sp constraint {} on missing dof {}", sp.tag, sp.dof))
            })?;
            *id = CONSTRAINED;
        }

        for mp in domain.mp_constraints() {
            for &dof in &mp.dofs {
                model.penalties.push(PenaltyFe {
                    retained: (mp.retained, dof),
                    constrained: (mp.constrained, dof),
                    ids: [CONSTRAINED; 2],
                });
            }
        }

        let num_ext = model
            .dof_groups
            .values()
            .flat_map(|g| g.ids.iter())
            .filter(|&&id| id == UNNUMBERED_EXTERNAL)
            .count();

        debug!(
            groups = model.dof_groups.len(),
            penalties = model.penalties.len(),
            num_ext,
            "constraints handled"
        );
        Ok(num_ext)
    }
}
