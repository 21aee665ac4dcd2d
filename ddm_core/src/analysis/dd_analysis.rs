//! Condensed analysis of one subdomain.

use nalgebra::{DMatrix, DVector};
use std::time::Instant;
use tracing::{debug, info};

use crate::analysis::config::{AlgorithmKind, AnalysisConfig, ConvergenceTest};
use crate::analysis::handler::ConstraintHandler;
use crate::analysis::integrator::LoadControl;
use crate::analysis::model::AnalysisModel;
use crate::analysis::numberer::DofNumberer;
use crate::analysis::soe::LinearSoe;
use crate::analysis::solver::DomainSolver;
use crate::broker::ObjectBroker;
use crate::error::{DdError, DdResult};
use crate::model::Domain;

/// Where the analysis stands within the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    /// Never looked at the domain
    Initial,
    /// Equations numbered, nothing formed for the current state
    Rebuilt,
    /// Condensed tangent current
    TangentFormed,
    /// Condensed tangent and residual current
    ResidualFormed,
}

/// Owns the analysis aggregate of one subdomain and condenses its tangent
/// and residual onto the interface equations.
///
/// The domain is passed into every call; the analysis keeps only its last
/// observed change stamp and rebuilds whenever the domain's stamp differs.
///
/// # Staleness
///
/// Formed quantities are keyed by a state generation. `invalidate` bumps it
/// and must be called after anything that changes trial state (update,
/// commit, revert, new step, load application). A `form_tangent` for a
/// generation that already has its tangent is a no-op.
#[derive(Debug)]
pub struct DomainDecompositionAnalysis {
    subdomain: i32,

    handler: ConstraintHandler,
    numberer: DofNumberer,
    model: AnalysisModel,
    soe: LinearSoe,
    integrator: LoadControl,
    algorithm: AlgorithmKind,
    test: ConvergenceTest,
    solver: Box<dyn DomainSolver>,

    /// Last observed domain change stamp
    domain_stamp: Option<u64>,
    generation: u64,
    tangent_generation: Option<u64>,
    residual_generation: Option<u64>,

    num_eqn: usize,
    num_ext_eqn: usize,

    rebuilds: usize,
    /// Seconds spent in the last tangent plus residual formation
    last_cost: f64,
}

impl DomainDecompositionAnalysis {
    pub fn new(subdomain: i32, config: &AnalysisConfig, solver: Box<dyn DomainSolver>) -> Self {
        Self {
            subdomain,
            handler: ConstraintHandler::new(config.penalty_alpha),
            numberer: DofNumberer,
            model: AnalysisModel::default(),
            soe: LinearSoe::default(),
            integrator: config.integrator.clone(),
            algorithm: config.algorithm,
            test: config.test,
            solver,
            domain_stamp: None,
            generation: 0,
            tangent_generation: None,
            residual_generation: None,
            num_eqn: 0,
            num_ext_eqn: 0,
            rebuilds: 0,
            last_cost: 0.0,
        }
    }

    /// Builds the analysis with the solver named in `config`.
    pub fn from_config(
        subdomain: i32,
        config: &AnalysisConfig,
        broker: &ObjectBroker,
    ) -> DdResult<Self> {
        let solver = broker
            .new_domain_solver(config.solver)
            .ok_or(DdError::UnknownClassTag(config.solver))?;
        Ok(Self::new(subdomain, config, solver))
    }

    // ========================================================================
    // SETTINGS
    // ========================================================================

    pub fn set_algorithm(&mut self, algorithm: AlgorithmKind) {
        self.algorithm = algorithm;
    }

    pub fn set_integrator(&mut self, integrator: LoadControl) {
        self.integrator = integrator;
        self.invalidate();
    }

    pub fn set_convergence_test(&mut self, test: ConvergenceTest) {
        self.test = test;
    }

    /// Installs a new solver; the next call rebuilds.
    pub fn set_solver(&mut self, solver: Box<dyn DomainSolver>) {
        self.solver = solver;
        self.domain_stamp = None;
        self.invalidate();
    }

    pub fn algorithm(&self) -> AlgorithmKind {
        self.algorithm
    }

    pub fn integrator(&self) -> &LoadControl {
        &self.integrator
    }

    pub fn model(&self) -> &AnalysisModel {
        &self.model
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn phase(&self) -> AnalysisPhase {
        if self.domain_stamp.is_none() {
            AnalysisPhase::Initial
        } else if self.residual_generation == Some(self.generation) {
            AnalysisPhase::ResidualFormed
        } else if self.tangent_generation == Some(self.generation) {
            AnalysisPhase::TangentFormed
        } else {
            AnalysisPhase::Rebuilt
        }
    }

    /// Marks every formed quantity stale.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    pub fn num_eqn(&self) -> usize {
        self.num_eqn
    }

    pub fn num_external_eqn(&self) -> usize {
        self.num_ext_eqn
    }

    pub fn num_internal_eqn(&self) -> usize {
        self.num_eqn - self.num_ext_eqn
    }

    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }

    pub fn last_cost(&self) -> f64 {
        self.last_cost
    }

    /// Rebuilds the equation layout for the domain's current mesh.
    pub fn domain_changed(&mut self, domain: &Domain) -> DdResult<()> {
        self.model.clear();
        let num_ext = self.handler.handle(domain, &mut self.model)?;
        let num_eqn = self.numberer.number(domain, &mut self.model)?;

        self.soe.set_size(num_eqn);
        self.solver.set_size(num_eqn);
        self.num_eqn = num_eqn;
        self.num_ext_eqn = num_ext;

        self.domain_stamp = Some(domain.stamp());
        self.tangent_generation = None;
        self.residual_generation = None;
        self.rebuilds += 1;

        info!(
            subdomain = self.subdomain,
            num_eqn,
            num_ext,
            stamp = domain.stamp(),
            "analysis rebuilt"
        );
        Ok(())
    }

    /// Drops the equation layout and everything formed; settings are kept
    /// and the next call rebuilds.
    pub fn clear_all(&mut self) {
        self.model.clear();
        self.soe.set_size(0);
        self.solver.set_size(0);
        self.num_eqn = 0;
        self.num_ext_eqn = 0;
        self.domain_stamp = None;
        self.tangent_generation = None;
        self.residual_generation = None;
    }

    /// Rebuilds when the domain changed since the last look. Returns whether
    /// a rebuild happened.
    pub fn check_domain(&mut self, domain: &Domain) -> DdResult<bool> {
        if self.domain_stamp == Some(domain.stamp()) {
            return Ok(false);
        }
        self.domain_changed(domain)?;
        Ok(true)
    }

    // ========================================================================
    // CONDENSATION
    // ========================================================================

    pub fn form_tangent(&mut self, domain: &Domain) -> DdResult<()> {
        self.check_domain(domain)?;
        if self.tangent_generation == Some(self.generation) {
            return Ok(());
        }

        let num_int = self.num_internal_eqn();
        let start = Instant::now();
        self.integrator
            .form_tangent(domain, &self.model, &mut self.soe, self.handler.alpha)?;
        self.solver.condense_a(self.soe.a(), num_int)?;
        self.last_cost = start.elapsed().as_secs_f64();

        self.tangent_generation = Some(self.generation);
        self.residual_generation = None;
        debug!(subdomain = self.subdomain, generation = self.generation, "tangent condensed");
        Ok(())
    }

    pub fn form_residual(&mut self, domain: &Domain) -> DdResult<()> {
        self.form_tangent(domain)?;
        if self.residual_generation == Some(self.generation) {
            return Ok(());
        }

        let num_int = self.num_internal_eqn();
        let start = Instant::now();
        self.integrator
            .form_unbalance(domain, &self.model, &mut self.soe, self.handler.alpha)?;
        self.solver.condense_rhs(self.soe.b(), num_int)?;
        self.last_cost += start.elapsed().as_secs_f64();

        self.residual_generation = Some(self.generation);
        Ok(())
    }

    /// Condensed tangent, sized to the interface.
    pub fn get_tangent(&mut self, domain: &Domain) -> DdResult<DMatrix<f64>> {
        self.form_tangent(domain)?;
        Ok(self.solver.condensed_a()?.clone())
    }

    /// Condensed residual, sized to the interface.
    pub fn get_residual(&mut self, domain: &Domain) -> DdResult<DVector<f64>> {
        self.form_residual(domain)?;
        Ok(self.solver.condensed_rhs()?.clone())
    }

    pub fn form_tang_vect_product(&mut self, domain: &Domain, u: &DVector<f64>) -> DdResult<()> {
        self.form_tangent(domain)?;
        let num_int = self.num_internal_eqn();
        self.solver.compute_condensed_mat_vect(num_int, u)
    }

    pub fn get_tang_vect_product(&self) -> DdResult<DVector<f64>> {
        Ok(self.solver.condensed_mat_vect()?.clone())
    }

    // ========================================================================
    // STEPPING
    // ========================================================================

    /// Starts a load step. Load control takes its increment from the
    /// integrator; `dt` is recorded as the domain time increment.
    pub fn new_step(&mut self, domain: &mut Domain, dt: f64) -> DdResult<()> {
        self.check_domain(domain)?;
        let time = domain.current_time();
        domain.update_time_dt(time, dt);
        self.integrator.new_step(domain)?;
        self.invalidate();
        Ok(())
    }

    /// Completes the subdomain solve for an interface increment.
    ///
    /// Internal increments follow by back-substitution; with the Newton
    /// algorithm the internal equations are then iterated to equilibrium with
    /// the interface held fixed.
    pub fn compute_internal_response(
        &mut self,
        domain: &mut Domain,
        delta_ext: &DVector<f64>,
    ) -> DdResult<()> {
        self.form_residual(domain)?;
        if delta_ext.len() != self.num_ext_eqn {
            return Err(DdError::invalid_state(format!(
                "interface increment of size {} for {} interface equations",
                delta_ext.len(),
                self.num_ext_eqn
            )));
        }

        let num_int = self.num_internal_eqn();
        let delta_int = self.solver.solve_xint(num_int, delta_ext)?;
        self.apply_increment(domain, &delta_int, delta_ext)?;

        if self.algorithm == AlgorithmKind::Linear || num_int == 0 {
            return Ok(());
        }

        let zero_ext = DVector::zeros(self.num_ext_eqn);
        for iteration in 1..=self.test.max_iter {
            self.form_residual(domain)?;
            let norm = self.soe.b().rows(0, num_int).norm();
            if self.test.is_converged(norm) {
                debug!(subdomain = self.subdomain, iteration, norm, "internal equilibrium");
                return Ok(());
            }
            let delta_int = self.solver.solve_xint(num_int, &zero_ext)?;
            self.apply_increment(domain, &delta_int, &zero_ext)?;
        }

        self.form_residual(domain)?;
        let norm = self.soe.b().rows(0, num_int).norm();
        if self.test.is_converged(norm) {
            return Ok(());
        }
        Err(DdError::NotConverged {
            iterations: self.test.max_iter,
            norm,
        })
    }

    fn apply_increment(
        &mut self,
        domain: &mut Domain,
        delta_int: &DVector<f64>,
        delta_ext: &DVector<f64>,
    ) -> DdResult<()> {
        let dx = DVector::from_iterator(
            self.num_eqn,
            delta_int.iter().chain(delta_ext.iter()).copied(),
        );
        self.integrator.update(domain, &self.model, &dx)?;
        self.invalidate();
        Ok(())
    }

    /// Interface `(node, dof)` of every condensed row, in row order.
    pub fn interface_dofs(&mut self, domain: &Domain) -> DdResult<Vec<(i32, usize)>> {
        self.check_domain(domain)?;
        Ok(self.model.owners(self.num_internal_eqn(), self.num_ext_eqn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::solver::LuDomainSolver;
    use crate::model::{LoadPattern, NodalLoad, Node, SpConstraint, Spring1D, TimeSeries};
    use approx::assert_relative_eq;

    /// Fixed - 1 - 2 - [3 external], springs of stiffness 10, unit load on 3.
    fn chain() -> Domain {
        let mut domain = Domain::new();
        domain.add_node(Node::new(1, 1, vec![0.0])).unwrap();
        domain.add_node(Node::new(2, 1, vec![1.0])).unwrap();
        domain.add_external_node(Node::new(3, 1, vec![2.0])).unwrap();
        domain.add_element(Box::new(Spring1D::new(1, 1, 2, 10.0))).unwrap();
        domain.add_element(Box::new(Spring1D::new(2, 2, 3, 10.0))).unwrap();
        domain.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
        let pattern = LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 })
            .with_nodal_load(NodalLoad::new(1, 3, vec![1.0]));
        domain.add_load_pattern(pattern).unwrap();
        domain
    }

    fn analysis() -> DomainDecompositionAnalysis {
        DomainDecompositionAnalysis::new(
            1,
            &AnalysisConfig::default(),
            Box::new(LuDomainSolver::default()),
        )
    }

    #[test]
    fn test_form_tangent_is_idempotent() {
        let domain = chain();
        let mut analysis = analysis();

        analysis.form_tangent(&domain).unwrap();
        analysis.form_tangent(&domain).unwrap();
        assert_eq!(analysis.integrator().tangent_count(), 1);

        analysis.invalidate();
        analysis.form_tangent(&domain).unwrap();
        assert_eq!(analysis.integrator().tangent_count(), 2);
    }

    #[test]
    fn test_rebuild_only_on_stamp_change() {
        let mut domain = chain();
        let mut analysis = analysis();
        assert_eq!(analysis.phase(), AnalysisPhase::Initial);

        analysis.get_tangent(&domain).unwrap();
        analysis.get_residual(&domain).unwrap();
        analysis.get_tangent(&domain).unwrap();
        assert_eq!(analysis.rebuild_count(), 1);
        assert_eq!(analysis.phase(), AnalysisPhase::ResidualFormed);

        domain.domain_change();
        assert!(analysis.check_domain(&domain).unwrap());
        assert!(!analysis.check_domain(&domain).unwrap());
        assert_eq!(analysis.rebuild_count(), 2);
        assert_eq!(analysis.phase(), AnalysisPhase::Rebuilt);
    }

    #[test]
    fn test_residual_forms_missing_tangent() {
        let domain = chain();
        let mut analysis = analysis();
        analysis.form_residual(&domain).unwrap();
        assert_eq!(analysis.integrator().tangent_count(), 1);
        assert_eq!(analysis.phase(), AnalysisPhase::ResidualFormed);
    }

    #[test]
    fn test_condensed_chain() {
        let mut domain = chain();
        let mut analysis = analysis();
        analysis.new_step(&mut domain, 1.0).unwrap();

        assert_eq!(analysis.num_eqn(), 2);
        assert_eq!(analysis.num_external_eqn(), 1);
        assert_eq!(analysis.num_internal_eqn(), 1);

        // two springs of 10 in series
        let s = analysis.get_tangent(&domain).unwrap();
        assert_relative_eq!(s[(0, 0)], 5.0, epsilon = 1e-12);
        let r = analysis.get_residual(&domain).unwrap();
        assert_relative_eq!(r[0], 1.0, epsilon = 1e-12);

        let delta = DVector::from_element(1, r[0] / s[(0, 0)]);
        analysis.compute_internal_response(&mut domain, &delta).unwrap();
        assert_relative_eq!(domain.node(3).unwrap().trial_disp()[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(domain.node(2).unwrap().trial_disp()[0], 0.1, epsilon = 1e-12);

        let r = analysis.get_residual(&domain).unwrap();
        assert_relative_eq!(r[0], 0.0, epsilon = 1e-10);
        assert_eq!(
            analysis.interface_dofs(&domain).unwrap(),
            vec![(3, 0)]
        );
    }

    #[test]
    fn test_tang_vect_product() {
        let domain = chain();
        let mut analysis = analysis();
        analysis
            .form_tang_vect_product(&domain, &DVector::from_element(1, 2.0))
            .unwrap();
        assert_relative_eq!(analysis.get_tang_vect_product().unwrap()[0], 10.0, epsilon = 1e-12);
    }
}
