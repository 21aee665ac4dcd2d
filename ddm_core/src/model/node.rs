//! Mesh nodes: coordinates, trial/committed displacement, applied load.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{DdError, DdResult};

/// A node with `ndf` degrees of freedom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node tag, unique within the model
    pub tag: i32,

    /// Nodal coordinates (1, 2 or 3 components)
    pub coords: Vec<f64>,

    /// Number of degrees of freedom
    ndf: usize,

    /// Trial displacement of the current iteration
    trial_disp: DVector<f64>,

    /// Displacement at the last commit
    commit_disp: DVector<f64>,

    /// External load accumulated by the last `apply_load`
    unbalanced_load: DVector<f64>,

    /// Lumped or consistent nodal mass (stored for dynamic integrators)
    mass: Option<DMatrix<f64>>,
}

impl Default for Node {
    fn default() -> Self {
        Self::new(0, 1, vec![0.0])
    }
}

impl Node {
    /// Creates a node at rest.
    pub fn new(tag: i32, ndf: usize, coords: Vec<f64>) -> Self {
        Self {
            tag,
            coords,
            ndf,
            trial_disp: DVector::zeros(ndf),
            commit_disp: DVector::zeros(ndf),
            unbalanced_load: DVector::zeros(ndf),
            mass: None,
        }
    }

    pub fn ndf(&self) -> usize {
        self.ndf
    }

    pub fn trial_disp(&self) -> &DVector<f64> {
        &self.trial_disp
    }

    pub fn committed_disp(&self) -> &DVector<f64> {
        &self.commit_disp
    }

    pub fn unbalanced_load(&self) -> &DVector<f64> {
        &self.unbalanced_load
    }

    pub fn mass(&self) -> Option<&DMatrix<f64>> {
        self.mass.as_ref()
    }

    fn check_dof(&self, dof: usize) -> DdResult<()> {
        if dof >= self.ndf {
            return Err(DdError::invalid_model(format!(
                "node {} has {} dofs, dof {} requested",
                self.tag, self.ndf, dof
            )));
        }
        Ok(())
    }

    /// Sets the trial displacement of one DOF (prescribed values).
    pub fn set_trial_disp(&mut self, dof: usize, value: f64) -> DdResult<()> {
        self.check_dof(dof)?;
        self.trial_disp[dof] = value;
        Ok(())
    }

    /// Adds an increment to the trial displacement of one DOF.
    pub fn incr_trial_disp(&mut self, dof: usize, delta: f64) -> DdResult<()> {
        self.check_dof(dof)?;
        self.trial_disp[dof] += delta;
        Ok(())
    }

    pub fn zero_unbalanced_load(&mut self) {
        self.unbalanced_load.fill(0.0);
    }

    /// Adds `factor * load` to the applied nodal load.
    pub fn add_unbalanced_load(&mut self, load: &[f64], factor: f64) -> DdResult<()> {
        if load.len() != self.ndf {
            return Err(DdError::invalid_model(format!(
                "load of size {} on node {} with {} dofs",
                load.len(),
                self.tag,
                self.ndf
            )));
        }
        for (acc, value) in self.unbalanced_load.iter_mut().zip(load) {
            *acc += factor * value;
        }
        Ok(())
    }

    /// Installs a nodal mass matrix of size `ndf x ndf`.
    pub fn set_mass(&mut self, mass: DMatrix<f64>) -> DdResult<()> {
        if mass.nrows() != self.ndf || mass.ncols() != self.ndf {
            return Err(DdError::invalid_model(format!(
                "mass {}x{} for node {} with {} dofs",
                mass.nrows(),
                mass.ncols(),
                self.tag,
                self.ndf
            )));
        }
        self.mass = Some(mass);
        Ok(())
    }

    pub fn commit_state(&mut self) {
        self.commit_disp.copy_from(&self.trial_disp);
    }

    pub fn revert_to_last_commit(&mut self) {
        self.trial_disp.copy_from(&self.commit_disp);
    }

    pub fn revert_to_start(&mut self) {
        self.trial_disp.fill(0.0);
        self.commit_disp.fill(0.0);
        self.unbalanced_load.fill(0.0);
    }
}

impl_movable!(Node, crate::broker::class_tags::NODE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_and_revert() {
        let mut node = Node::new(1, 2, vec![0.0, 0.0]);
        node.incr_trial_disp(1, 0.5).unwrap();
        node.commit_state();
        node.incr_trial_disp(1, 0.25).unwrap();
        assert_eq!(node.trial_disp()[1], 0.75);

        node.revert_to_last_commit();
        assert_eq!(node.trial_disp()[1], 0.5);

        node.revert_to_start();
        assert_eq!(node.trial_disp()[1], 0.0);
        assert_eq!(node.committed_disp()[1], 0.0);
    }

    #[test]
    fn test_dof_bounds() {
        let mut node = Node::new(1, 1, vec![0.0]);
        assert!(node.set_trial_disp(1, 1.0).is_err());
        assert!(node.add_unbalanced_load(&[1.0, 2.0], 1.0).is_err());
        assert!(node.set_mass(DMatrix::identity(2, 2)).is_err());
    }
}
