//! Ground-truth solver for the undivided model.
//!
//! The oracle keeps the whole mesh in one `Domain` and runs a plain
//! Newton-Raphson on all free DOFs: no condensation, no channels, no
//! subdomains. Decomposed runs are judged against its displacements.

use ddm_core::model::Element;
use ddm_core::{DdError, DdResult, Domain, ModelDescription};
use nalgebra::{DMatrix, DVector};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Direct solver over the complete model.
pub struct Oracle {
    domain: Domain,
    /// Equation number of every free `(node, dof)`
    equations: BTreeMap<(i32, usize), usize>,
    tol: f64,
    max_iter: usize,
}

impl Oracle {
    /// Builds the oracle's copy of the model. Equal-DOF constraints are not
    /// supported.
    pub fn new(model: &ModelDescription) -> DdResult<Self> {
        if !model.mp_constraints.is_empty() {
            return Err(DdError::invalid_model(
                "oracle does not handle multi-point constraints",
            ));
        }

        let mut domain = Domain::new();
        for node in &model.nodes {
            domain.add_node(node.clone())?;
        }
        for element in &model.elements {
            domain.add_element(element.clone())?;
        }
        for sp in &model.sp_constraints {
            domain.add_sp_constraint(sp.clone())?;
        }
        for pattern in &model.load_patterns {
            domain.add_load_pattern(pattern.clone())?;
        }

        let mut oracle = Self {
            domain,
            equations: BTreeMap::new(),
            tol: 1e-10,
            max_iter: 50,
        };
        oracle.number();
        Ok(oracle)
    }

    pub fn with_tolerance(mut self, tol: f64, max_iter: usize) -> Self {
        self.tol = tol;
        self.max_iter = max_iter;
        self
    }

    pub fn num_eqn(&self) -> usize {
        self.equations.len()
    }

    fn number(&mut self) {
        let fixed: BTreeSet<(i32, usize)> = self
            .domain
            .all_sp_constraints()
            .map(|sp| (sp.node, sp.dof))
            .collect();
        self.equations.clear();
        for (tag, node) in self.domain.nodes() {
            for dof in 0..node.ndf() {
                if !fixed.contains(&(*tag, dof)) {
                    let next = self.equations.len();
                    self.equations.insert((*tag, dof), next);
                }
            }
        }
    }

    /// Swaps an element for another one with the same tag.
    pub fn replace_element(&mut self, element: Box<dyn Element>) -> DdResult<()> {
        self.domain.remove_element(element.tag());
        self.domain.add_element(element)?;
        self.number();
        Ok(())
    }

    /// Solves equilibrium at load factor `time` and commits. Returns the
    /// number of Newton corrections.
    pub fn solve_to(&mut self, time: f64) -> DdResult<usize> {
        self.domain.apply_load(time)?;

        let mut norm = f64::INFINITY;
        for iteration in 0..=self.max_iter {
            let (k, r) = self.assemble()?;
            norm = r.norm();
            if norm <= self.tol {
                debug!(time, iterations = iteration, "oracle converged");
                self.domain.commit();
                return Ok(iteration);
            }
            let dx = k
                .lu()
                .solve(&r)
                .ok_or_else(|| DdError::numerical("oracle stiffness is singular"))?;
            for (&(node, dof), &eq) in &self.equations {
                self.domain.node_mut(node)?.incr_trial_disp(dof, dx[eq])?;
            }
        }
        Err(DdError::NotConverged {
            iterations: self.max_iter,
            norm,
        })
    }

    /// Tangent and unbalance `P - F(u)` over the free DOFs.
    fn assemble(&self) -> DdResult<(DMatrix<f64>, DVector<f64>)> {
        let n = self.equations.len();
        let mut k = DMatrix::zeros(n, n);
        let mut r = DVector::zeros(n);

        for (&(node, dof), &eq) in &self.equations {
            r[eq] += self.domain.node(node)?.unbalanced_load()[dof];
        }

        let nodes = self.domain.nodes();
        for element in self.domain.elements() {
            let dpn = element.dofs_per_node();
            let ids: Vec<Option<usize>> = element
                .connected_nodes()
                .iter()
                .flat_map(|&tag| (0..dpn).map(move |dof| (tag, dof)))
                .map(|key| self.equations.get(&key).copied())
                .collect();

            let ke = element.tangent_stiff(nodes)?;
            let fe = element.resisting_force(nodes)?;
            for (i, gi) in ids.iter().enumerate() {
                let Some(gi) = *gi else { continue };
                r[gi] -= fe[i];
                for (j, gj) in ids.iter().enumerate() {
                    if let Some(gj) = *gj {
                        k[(gi, gj)] += ke[(i, j)];
                    }
                }
            }
        }
        Ok((k, r))
    }

    pub fn disp(&self, node: i32, dof: usize) -> DdResult<f64> {
        let node_ref = self.domain.node(node)?;
        node_ref.trial_disp().get(dof).copied().ok_or_else(|| {
            DdError::invalid_model(format!("node {} has {} dofs", node, node_ref.ndf()))
        })
    }

    /// Every `(node, dof)` of the model, constrained ones included.
    pub fn dofs(&self) -> Vec<(i32, usize)> {
        self.domain
            .nodes()
            .iter()
            .flat_map(|(tag, node)| (0..node.ndf()).map(move |dof| (*tag, dof)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddm_core::model::{LoadPattern, NodalLoad, Node, SpConstraint, Spring1D, TimeSeries};

    fn two_springs(k3: f64) -> ModelDescription {
        let mut model = ModelDescription::default();
        for tag in 1..=3 {
            model.nodes.push(Node::new(tag, 1, vec![tag as f64]));
        }
        model
            .elements
            .push(Box::new(Spring1D::new(1, 1, 2, 2.0).with_hardening(k3)));
        model
            .elements
            .push(Box::new(Spring1D::new(2, 2, 3, 2.0).with_hardening(k3)));
        model.sp_constraints.push(SpConstraint::fixed(1, 1, 0));
        model.load_patterns.push(
            LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 })
                .with_nodal_load(NodalLoad::new(1, 3, vec![1.0])),
        );
        model
    }

    #[test]
    fn test_linear_springs() {
        let mut oracle = Oracle::new(&two_springs(0.0)).unwrap();
        assert_eq!(oracle.num_eqn(), 2);
        assert_eq!(oracle.solve_to(1.0).unwrap(), 1);
        assert!((oracle.disp(2, 0).unwrap() - 0.5).abs() < 1e-12);
        assert!((oracle.disp(3, 0).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hardening_springs_equilibrate() {
        let mut oracle = Oracle::new(&two_springs(1.0)).unwrap();
        assert!(oracle.solve_to(2.0).unwrap() > 1);
        let d = oracle.disp(2, 0).unwrap();
        assert!((2.0 * d + d * d * d - 2.0).abs() < 1e-9);
    }
}
