//! The subdomain that owns a mesh.

use ddm_env::ClassTag;
use nalgebra::{DMatrix, DVector};
use std::fmt::Write;
use tracing::debug;

use crate::analysis::{
    AlgorithmKind, AnalysisConfig, ConvergenceTest, DomainDecompositionAnalysis, LoadControl,
};
use crate::broker::ObjectBroker;
use crate::error::{DdError, DdResult};
use crate::model::{
    DisplacementRecorder, Domain, Element, ElementalLoad, EqualDof, LoadPattern, NodalLoad, Node,
    RayleighFactors, SpConstraint,
};
use crate::subdomain::{RemoteData, Subdomain, SubdomainBlueprint};

/// Mesh, condensed analysis and recorders of one subdomain, in process.
#[derive(Debug)]
pub struct LocalSubdomain {
    tag: i32,
    domain: Domain,
    analysis: Option<DomainDecompositionAnalysis>,
    recorders: Vec<DisplacementRecorder>,
    broker: ObjectBroker,
}

impl LocalSubdomain {
    pub fn new(tag: i32) -> Self {
        Self::with_broker(tag, ObjectBroker::default())
    }

    pub fn with_broker(tag: i32, broker: ObjectBroker) -> Self {
        Self {
            tag,
            domain: Domain::new(),
            analysis: None,
            recorders: Vec::new(),
            broker,
        }
    }

    /// Builds a subdomain from a blueprint with an analysis installed.
    pub fn from_blueprint(blueprint: &SubdomainBlueprint, config: &AnalysisConfig) -> DdResult<Self> {
        let mut subdomain = Self::new(blueprint.tag);
        blueprint.build(&mut subdomain.domain, &subdomain.broker)?;
        subdomain.set_domain_decomp_analysis(config.clone())?;
        Ok(subdomain)
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn domain_mut(&mut self) -> &mut Domain {
        &mut self.domain
    }

    pub fn analysis(&self) -> Option<&DomainDecompositionAnalysis> {
        self.analysis.as_ref()
    }

    pub fn recorders(&self) -> &[DisplacementRecorder] {
        &self.recorders
    }

    fn parts(&mut self) -> DdResult<(&mut DomainDecompositionAnalysis, &mut Domain)> {
        match self.analysis.as_mut() {
            Some(analysis) => Ok((analysis, &mut self.domain)),
            None => Err(DdError::NoAnalysis(self.tag)),
        }
    }

    /// Marks formed tangent and residual stale after a trial-state change.
    fn touch(&mut self) {
        if let Some(analysis) = self.analysis.as_mut() {
            analysis.invalidate();
        }
    }
}

impl Subdomain for LocalSubdomain {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn add_element(&mut self, element: Box<dyn Element>) -> DdResult<()> {
        self.domain.add_element(element)
    }

    fn add_node(&mut self, node: Node) -> DdResult<()> {
        self.domain.add_node(node)
    }

    fn add_external_node(&mut self, node: Node) -> DdResult<()> {
        self.domain.add_external_node(node)
    }

    fn add_sp_constraint(&mut self, sp: SpConstraint) -> DdResult<()> {
        self.domain.add_sp_constraint(sp)
    }

    fn add_mp_constraint(&mut self, mp: EqualDof) -> DdResult<()> {
        self.domain.add_mp_constraint(mp)
    }

    fn add_load_pattern(&mut self, pattern: LoadPattern) -> DdResult<()> {
        self.domain.add_load_pattern(pattern)
    }

    fn add_nodal_load(&mut self, load: NodalLoad, pattern: i32) -> DdResult<()> {
        self.domain.add_nodal_load(load, pattern)
    }

    fn add_elemental_load(&mut self, load: ElementalLoad, pattern: i32) -> DdResult<()> {
        self.domain.add_elemental_load(load, pattern)
    }

    fn add_sp_constraint_to_pattern(&mut self, sp: SpConstraint, pattern: i32) -> DdResult<()> {
        self.domain.add_sp_constraint_to_pattern(sp, pattern)
    }

    fn remove_element(&mut self, tag: i32) -> DdResult<Option<Box<dyn Element>>> {
        Ok(self.domain.remove_element(tag))
    }

    fn remove_node(&mut self, tag: i32) -> DdResult<Option<Node>> {
        self.domain.remove_node(tag)
    }

    fn remove_sp_constraint(&mut self, tag: i32) -> DdResult<Option<SpConstraint>> {
        Ok(self.domain.remove_sp_constraint(tag))
    }

    fn remove_mp_constraint(&mut self, tag: i32) -> DdResult<Option<EqualDof>> {
        Ok(self.domain.remove_mp_constraint(tag))
    }

    fn remove_load_pattern(&mut self, tag: i32) -> DdResult<Option<LoadPattern>> {
        Ok(self.domain.remove_load_pattern(tag))
    }

    fn remove_nodal_load(&mut self, tag: i32, pattern: i32) -> DdResult<Option<NodalLoad>> {
        self.domain.remove_nodal_load(tag, pattern)
    }

    fn remove_elemental_load(
        &mut self,
        tag: i32,
        pattern: i32,
    ) -> DdResult<Option<ElementalLoad>> {
        self.domain.remove_elemental_load(tag, pattern)
    }

    fn remove_sp_constraint_from_pattern(
        &mut self,
        tag: i32,
        pattern: i32,
    ) -> DdResult<Option<SpConstraint>> {
        self.domain.remove_sp_constraint_from_pattern(tag, pattern)
    }

    fn build_subdomain(&mut self, blueprint: SubdomainBlueprint) -> DdResult<()> {
        self.domain.clear_all();
        let built = blueprint.build(&mut self.domain, &self.broker);
        if built.is_err() {
            // leave no half-built mesh behind
            self.domain.clear_all();
        }
        built?;
        debug!(subdomain = self.tag, "{}", self.domain.summary());
        Ok(())
    }

    fn clear_all(&mut self) -> DdResult<()> {
        self.domain.clear_all();
        self.recorders.clear();
        if let Some(analysis) = self.analysis.as_mut() {
            analysis.clear_all();
        }
        Ok(())
    }

    fn get_element(&mut self, tag: i32) -> DdResult<Option<Box<dyn Element>>> {
        Ok(self.domain.element(tag).ok().map(|e| e.clone_box()))
    }

    fn get_node(&mut self, tag: i32) -> DdResult<Option<Node>> {
        Ok(self.domain.node(tag).ok().cloned())
    }

    fn has_element(&mut self, tag: i32) -> DdResult<bool> {
        Ok(self.domain.has_element(tag))
    }

    fn has_node(&mut self, tag: i32) -> DdResult<bool> {
        Ok(self.domain.has_node(tag))
    }

    fn get_node_disp(&mut self, node: i32, dof: usize) -> DdResult<f64> {
        let node_ref = self.domain.node(node)?;
        node_ref.trial_disp().get(dof).copied().ok_or_else(|| {
            DdError::invalid_model(format!("node {} has {} dofs", node, node_ref.ndf()))
        })
    }

    fn print(&mut self) -> DdResult<String> {
        let mut out = format!("Subdomain {}: {}", self.tag, self.domain.summary());
        match &self.analysis {
            Some(analysis) => {
                let _ = write!(
                    out,
                    "\n  analysis: {:?}, {} equations ({} external), algorithm {}",
                    analysis.phase(),
                    analysis.num_eqn(),
                    analysis.num_external_eqn(),
                    analysis.algorithm()
                );
            }
            None => out.push_str("\n  analysis: none"),
        }
        for recorder in &self.recorders {
            let _ = write!(
                out,
                "\n  recorder {}: {} rows",
                recorder.tag,
                recorder.rows.len()
            );
        }
        Ok(out)
    }

    fn set_tag(&mut self, tag: i32) -> DdResult<()> {
        self.tag = tag;
        Ok(())
    }

    fn set_commit_tag(&mut self, tag: i32) -> DdResult<()> {
        self.domain.set_commit_tag(tag);
        Ok(())
    }

    fn set_current_time(&mut self, time: f64) -> DdResult<()> {
        self.domain.set_current_time(time);
        Ok(())
    }

    fn set_committed_time(&mut self, time: f64) -> DdResult<()> {
        self.domain.set_committed_time(time);
        Ok(())
    }

    fn update_time_dt(&mut self, time: f64, dt: f64) -> DdResult<()> {
        self.domain.update_time_dt(time, dt);
        Ok(())
    }

    fn set_load_constant(&mut self) -> DdResult<()> {
        self.domain.set_load_constant();
        Ok(())
    }

    fn apply_load(&mut self, time: f64) -> DdResult<()> {
        self.domain.apply_load(time)?;
        self.touch();
        Ok(())
    }

    fn update(&mut self) -> DdResult<()> {
        self.touch();
        Ok(())
    }

    fn commit(&mut self) -> DdResult<()> {
        self.domain.commit();
        let time = self.domain.current_time();
        for recorder in &mut self.recorders {
            recorder.record(time, self.domain.nodes());
        }
        self.touch();
        Ok(())
    }

    fn revert_to_last_commit(&mut self) -> DdResult<()> {
        self.domain.revert_to_last_commit();
        self.touch();
        Ok(())
    }

    fn revert_to_start(&mut self) -> DdResult<()> {
        self.domain.revert_to_start();
        self.touch();
        Ok(())
    }

    fn set_mass(&mut self, node: i32, mass: DMatrix<f64>) -> DdResult<()> {
        self.domain.set_mass(node, mass)
    }

    fn set_rayleigh_damping_factors(&mut self, factors: RayleighFactors) -> DdResult<()> {
        self.domain.set_rayleigh_damping_factors(factors);
        Ok(())
    }

    fn add_recorder(&mut self, recorder: DisplacementRecorder) -> DdResult<()> {
        self.recorders.push(recorder);
        Ok(())
    }

    fn remove_recorders(&mut self) -> DdResult<()> {
        self.recorders.clear();
        Ok(())
    }

    fn set_domain_decomp_analysis(&mut self, config: AnalysisConfig) -> DdResult<()> {
        let analysis = DomainDecompositionAnalysis::from_config(self.tag, &config, &self.broker)?;
        self.analysis = Some(analysis);
        Ok(())
    }

    fn domain_change(&mut self) -> DdResult<()> {
        self.domain.domain_change();
        Ok(())
    }

    fn clear_analysis(&mut self) -> DdResult<()> {
        if let Some(analysis) = self.analysis.as_mut() {
            analysis.clear_all();
        }
        Ok(())
    }

    fn wipe_analysis(&mut self) -> DdResult<()> {
        self.analysis = None;
        Ok(())
    }

    fn set_analysis_algorithm(&mut self, algorithm: AlgorithmKind) -> DdResult<()> {
        self.parts()?.0.set_algorithm(algorithm);
        Ok(())
    }

    fn set_analysis_integrator(&mut self, integrator: LoadControl) -> DdResult<()> {
        self.parts()?.0.set_integrator(integrator);
        Ok(())
    }

    fn set_analysis_linear_soe(&mut self, solver: ClassTag) -> DdResult<()> {
        let solver = self
            .broker
            .new_domain_solver(solver)
            .ok_or(DdError::UnknownClassTag(solver))?;
        self.parts()?.0.set_solver(solver);
        Ok(())
    }

    fn set_analysis_convergence_test(&mut self, test: ConvergenceTest) -> DdResult<()> {
        self.parts()?.0.set_convergence_test(test);
        Ok(())
    }

    fn new_step(&mut self, dt: f64) -> DdResult<()> {
        let (analysis, domain) = self.parts()?;
        analysis.new_step(domain, dt)
    }

    fn compute_tang(&mut self) -> DdResult<()> {
        let (analysis, domain) = self.parts()?;
        analysis.form_tangent(domain)
    }

    fn compute_residual(&mut self) -> DdResult<()> {
        let (analysis, domain) = self.parts()?;
        analysis.form_residual(domain)
    }

    fn get_tang(&mut self) -> DdResult<DMatrix<f64>> {
        let (analysis, domain) = self.parts()?;
        analysis.get_tangent(domain)
    }

    fn get_resisting_force(&mut self) -> DdResult<DVector<f64>> {
        let (analysis, domain) = self.parts()?;
        analysis.get_residual(domain)
    }

    fn compute_nodal_response(&mut self, delta_ext: &DVector<f64>) -> DdResult<()> {
        let (analysis, domain) = self.parts()?;
        analysis.compute_internal_response(domain, delta_ext)
    }

    fn get_cost(&mut self) -> DdResult<f64> {
        Ok(self.parts()?.0.last_cost())
    }

    fn get_remote_data(&mut self) -> DdResult<RemoteData> {
        let (analysis, domain) = self.parts()?;
        Ok(RemoteData {
            interface: analysis.interface_dofs(domain)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Spring1D, TimeSeries};

    fn subdomain() -> LocalSubdomain {
        let mut sub = LocalSubdomain::new(1);
        sub.add_node(Node::new(1, 1, vec![0.0])).unwrap();
        sub.add_external_node(Node::new(2, 1, vec![1.0])).unwrap();
        sub.add_element(Box::new(Spring1D::new(1, 1, 2, 4.0))).unwrap();
        sub.add_sp_constraint(SpConstraint::fixed(1, 1, 0)).unwrap();
        sub.add_load_pattern(LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 }))
            .unwrap();
        sub.add_nodal_load(NodalLoad::new(1, 2, vec![2.0]), 1).unwrap();
        sub
    }

    #[test]
    fn test_analysis_required() {
        let mut sub = subdomain();
        assert!(matches!(sub.get_tang(), Err(DdError::NoAnalysis(1))));

        sub.set_domain_decomp_analysis(AnalysisConfig::default())
            .unwrap();
        assert_eq!(sub.get_tang().unwrap()[(0, 0)], 4.0);

        sub.wipe_analysis().unwrap();
        assert!(matches!(sub.compute_tang(), Err(DdError::NoAnalysis(1))));
    }

    #[test]
    fn test_commit_feeds_recorders() {
        let mut sub = subdomain();
        sub.set_domain_decomp_analysis(AnalysisConfig::default())
            .unwrap();
        sub.add_recorder(DisplacementRecorder::new(1, vec![2], 0))
            .unwrap();

        sub.new_step(1.0).unwrap();
        let r = sub.get_resisting_force().unwrap();
        let k = sub.get_tang().unwrap();
        sub.compute_nodal_response(&DVector::from_element(1, r[0] / k[(0, 0)]))
            .unwrap();
        sub.commit().unwrap();

        assert_eq!(sub.get_node_disp(2, 0).unwrap(), 0.5);
        assert_eq!(sub.recorders()[0].rows, vec![(1.0, vec![0.5])]);
        assert!(sub.print().unwrap().contains("recorder 1: 1 rows"));
    }

    #[test]
    fn test_remote_data_lists_interface() {
        let mut sub = subdomain();
        sub.set_domain_decomp_analysis(AnalysisConfig::default())
            .unwrap();
        let data = sub.get_remote_data().unwrap();
        assert_eq!(data.interface, vec![(2, 0)]);
    }

    #[test]
    fn test_get_returns_copies() {
        let mut sub = subdomain();
        let element = sub.get_element(1).unwrap().unwrap();
        assert_eq!(element.tag(), 1);
        assert!(sub.has_element(1).unwrap());
        assert!(sub.get_element(9).unwrap().is_none());
        assert!(sub.get_node(9).unwrap().is_none());
    }
}
