//! Static load-control integrator.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::analysis::model::AnalysisModel;
use crate::analysis::soe::LinearSoe;
use crate::broker::class_tags;
use crate::error::{DdError, DdResult};
use crate::model::Domain;

/// Advances the load factor by a fixed increment per step and forms the
/// tangent and unbalance of the subdomain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadControl {
    /// Load factor increment per step
    pub delta_lambda: f64,

    /// Number of `form_tangent` invocations (not part of the settings)
    #[serde(skip)]
    tangent_count: usize,
}

impl Default for LoadControl {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LoadControl {
    pub fn new(delta_lambda: f64) -> Self {
        Self {
            delta_lambda,
            tangent_count: 0,
        }
    }

    pub fn tangent_count(&self) -> usize {
        self.tangent_count
    }

    /// `λ += Δλ`, then applies the loads at the new factor.
    pub fn new_step(&mut self, domain: &mut Domain) -> DdResult<()> {
        let time = domain.current_time() + self.delta_lambda;
        domain.apply_load(time)
    }

    /// Assembles element stiffness and penalty terms into `A`.
    pub fn form_tangent(
        &mut self,
        domain: &Domain,
        model: &AnalysisModel,
        soe: &mut LinearSoe,
        alpha: f64,
    ) -> DdResult<()> {
        self.tangent_count += 1;
        soe.zero_a();

        for fe in &model.elements {
            let k = domain.element(fe.element)?.tangent_stiff(domain.nodes())?;
            soe.add_a(&k, &fe.ids);
        }

        let penalty = DMatrix::from_row_slice(2, 2, &[alpha, -alpha, -alpha, alpha]);
        for fe in &model.penalties {
            soe.add_a(&penalty, &fe.ids);
        }
        Ok(())
    }

    /// Assembles `r = P - (F_int - element loads)` into `b`, with the penalty
    /// forces of equal-DOF constraints on the resisting side.
    pub fn form_unbalance(
        &self,
        domain: &Domain,
        model: &AnalysisModel,
        soe: &mut LinearSoe,
        alpha: f64,
    ) -> DdResult<()> {
        soe.zero_b();

        for group in model.dof_groups.values() {
            let load = domain.node(group.node)?.unbalanced_load();
            soe.add_b(load, &group.ids, 1.0);
        }

        for fe in &model.elements {
            let f = domain.element(fe.element)?.resisting_force(domain.nodes())?;
            soe.add_b(&f, &fe.ids, -1.0);
        }

        for fe in &model.penalties {
            let retained = disp(domain, fe.retained)?;
            let constrained = disp(domain, fe.constrained)?;
            let gap = alpha * (retained - constrained);
            soe.add_b(&DVector::from_vec(vec![gap, -gap]), &fe.ids, -1.0);
        }
        Ok(())
    }

    /// Adds the solution increment `dx` to the trial displacements.
    pub fn update(
        &self,
        domain: &mut Domain,
        model: &AnalysisModel,
        dx: &DVector<f64>,
    ) -> DdResult<()> {
        if dx.len() != model.num_eqn() {
            return Err(DdError::invalid_state(format!(
                "increment of size {} for {} equations",
                dx.len(),
                model.num_eqn()
            )));
        }
        for group in model.dof_groups.values() {
            let node = domain.node_mut(group.node)?;
            for (dof, &id) in group.ids.iter().enumerate() {
                if id >= 0 {
                    node.incr_trial_disp(dof, dx[id as usize])?;
                }
            }
        }
        Ok(())
    }
}

fn disp(domain: &Domain, (node, dof): (i32, usize)) -> DdResult<f64> {
    domain
        .node(node)?
        .trial_disp()
        .get(dof)
        .copied()
        .ok_or_else(|| DdError::invalid_model(format!("node {node} has no dof {dof}")))
}

impl_movable!(LoadControl, class_tags::LOAD_CONTROL);
