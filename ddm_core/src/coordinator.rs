//! Global interface solve across all subdomains.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{DdError, DdResult};
use crate::subdomain::{RemoteData, Subdomain};

/// Settings of the coordinator's Newton loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Tolerance on the norm of the assembled condensed residual
    pub tol: f64,
    pub max_iter: usize,
    /// Time increment handed to `new_step`
    pub dt: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tol: 1e-8,
            max_iter: 20,
            dt: 1.0,
        }
    }
}

/// Outcome of one converged step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: i32,
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Owns every subdomain, local or remote, and solves the interface problem.
///
/// Each step: `new_step` everywhere, then Newton iterations on the assembled
/// condensed system until its residual norm is under `tol`. The norm is only
/// trusted once interface increments have been pushed at least once, so that
/// every subdomain has completed its internal solve for the step.
pub struct DomainDecompositionDriver {
    subdomains: Vec<Box<dyn Subdomain>>,
    config: DriverConfig,

    /// Global interface equation of every `(node, dof)`
    interface: BTreeMap<(i32, usize), usize>,
    /// Per subdomain, the global equation of each condensed row
    local_to_global: Vec<Vec<usize>>,

    steps_done: i32,
}

impl DomainDecompositionDriver {
    pub fn new(subdomains: Vec<Box<dyn Subdomain>>, config: DriverConfig) -> Self {
        Self {
            subdomains,
            config,
            interface: BTreeMap::new(),
            local_to_global: Vec::new(),
            steps_done: 0,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn subdomains(&self) -> &[Box<dyn Subdomain>] {
        &self.subdomains
    }

    pub fn subdomains_mut(&mut self) -> &mut [Box<dyn Subdomain>] {
        &mut self.subdomains
    }

    pub fn interface_size(&self) -> usize {
        self.interface.len()
    }

    /// Global interface equation of `(node, dof)`.
    pub fn interface_equation(&self, node: i32, dof: usize) -> Option<usize> {
        self.interface.get(&(node, dof)).copied()
    }

    /// Queries every subdomain for its interface layout and builds the
    /// global interface numbering.
    pub fn setup(&mut self) -> DdResult<()> {
        let mut layouts: Vec<RemoteData> = Vec::with_capacity(self.subdomains.len());
        for subdomain in &mut self.subdomains {
            layouts.push(subdomain.get_remote_data()?);
        }

        self.interface.clear();
        for layout in &layouts {
            for key in &layout.interface {
                let next = self.interface.len();
                self.interface.entry(*key).or_insert(next);
            }
        }
        self.local_to_global = layouts
            .iter()
            .map(|layout| layout.interface.iter().map(|key| self.interface[key]).collect())
            .collect();

        info!(
            subdomains = self.subdomains.len(),
            interface = self.interface.len(),
            "interface numbered"
        );
        Ok(())
    }

    /// Runs one load step; on failure every subdomain is reverted to its
    /// last committed state.
    pub fn solve_step(&mut self) -> DdResult<StepReport> {
        if self.local_to_global.len() != self.subdomains.len() {
            self.setup()?;
        }
        let step = self.steps_done + 1;

        match self.iterate(step) {
            Ok(report) => {
                for subdomain in &mut self.subdomains {
                    subdomain.set_commit_tag(step)?;
                    subdomain.commit()?;
                }
                self.steps_done = step;
                info!(step, iterations = report.iterations, norm = report.residual_norm, "step converged");
                Ok(report)
            }
            Err(err) => {
                warn!(step, "step failed: {}", err);
                for subdomain in &mut self.subdomains {
                    if let Err(revert_err) = subdomain.revert_to_last_commit() {
                        warn!(subdomain = subdomain.tag(), "revert failed: {}", revert_err);
                    }
                }
                Err(err)
            }
        }
    }

    /// Runs `num_steps` steps, stopping at the first failure.
    pub fn analyze(&mut self, num_steps: usize) -> DdResult<Vec<StepReport>> {
        let mut reports = Vec::with_capacity(num_steps);
        for _ in 0..num_steps {
            reports.push(self.solve_step()?);
        }
        Ok(reports)
    }

    fn iterate(&mut self, step: i32) -> DdResult<StepReport> {
        let dt = self.config.dt;
        for subdomain in &mut self.subdomains {
            subdomain.new_step(dt)?;
        }

        let n = self.interface.len();
        let mut norm = f64::INFINITY;
        for iteration in 1..=self.config.max_iter {
            let (k, r) = self.assemble()?;
            norm = r.norm();
            debug!(step, iteration, norm, "condensed residual");
            if iteration > 1 && norm <= self.config.tol {
                return Ok(StepReport {
                    step,
                    iterations: iteration - 1,
                    residual_norm: norm,
                });
            }

            let dx = if n == 0 {
                DVector::zeros(0)
            } else {
                k.lu()
                    .solve(&r)
                    .ok_or_else(|| DdError::numerical("singular interface system"))?
            };

            for (subdomain, map) in self.subdomains.iter_mut().zip(&self.local_to_global) {
                let local = DVector::from_iterator(map.len(), map.iter().map(|&g| dx[g]));
                subdomain.compute_nodal_response(&local)?;
            }
        }

        Err(DdError::NotConverged {
            iterations: self.config.max_iter,
            norm,
        })
    }

    /// Assembles the condensed tangents and residuals of every subdomain.
    fn assemble(&mut self) -> DdResult<(DMatrix<f64>, DVector<f64>)> {
        let n = self.interface.len();
        let mut k = DMatrix::zeros(n, n);
        let mut r = DVector::zeros(n);

        for (subdomain, map) in self.subdomains.iter_mut().zip(&self.local_to_global) {
            subdomain.compute_tang()?;
            subdomain.compute_residual()?;
            let k_local = subdomain.get_tang()?;
            let r_local = subdomain.get_resisting_force()?;
            if k_local.nrows() != map.len()
                || k_local.ncols() != map.len()
                || r_local.len() != map.len()
            {
                return Err(DdError::malformed(format!(
                    "subdomain {} returned a {}x{} tangent and {} residual entries for {} interface dofs",
                    subdomain.tag(),
                    k_local.nrows(),
                    k_local.ncols(),
                    r_local.len(),
                    map.len()
                )));
            }
            for (i, &gi) in map.iter().enumerate() {
                r[gi] += r_local[i];
                for (j, &gj) in map.iter().enumerate() {
                    k[(gi, gj)] += k_local[(i, j)];
                }
            }
        }
        Ok((k, r))
    }

    /// Trial displacement of `(node, dof)` as seen by the first subdomain
    /// that has the node.
    pub fn node_disp(&mut self, node: i32, dof: usize) -> DdResult<f64> {
        for subdomain in &mut self.subdomains {
            if subdomain.has_node(node)? {
                return subdomain.get_node_disp(node, dof);
            }
        }
        Err(DdError::UnknownNode(node))
    }

    /// Hands the subdomains back, e.g. to terminate remote ones explicitly.
    pub fn into_subdomains(self) -> Vec<Box<dyn Subdomain>> {
        self.subdomains
    }
}
