//! Scenario runner - executes decomposed analyses against the oracle.

use ddm_core::model::{Element, Spring1D};
use ddm_core::{AlgorithmKind, AnalysisConfig, DdError, ModelDescription, Partitioner};
use tracing::{debug, info, warn};

use crate::error::{SimError, SimResult};
use crate::model_gen::ModelGenerator;
use crate::oracle::Oracle;
use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld, WorkerOutcome};

/// Largest displacement error accepted, relative to the largest oracle
/// displacement (or absolute below 1).
pub const DISP_TOLERANCE: f64 = 1e-6;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Load steps that converged
    pub steps_completed: usize,

    /// Global interface equations
    pub interface_size: usize,

    /// Worst displacement error against the oracle over all steps
    pub max_error: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    /// Interface Newton iterations summed over all steps
    pub total_iterations: usize,

    /// Most interface iterations any single step needed
    pub max_iterations: usize,

    /// Workers that returned from their loop after the terminate opcode
    pub workers_clean: usize,

    /// Workers that ended with an error (hang-up, protocol skew, panic)
    pub workers_failed: usize,
}

/// Replace one element after a given step.
struct EditPlan {
    after_step: usize,
    element: Box<dyn Element>,
}

/// What a run produced before its workers were shut down.
#[derive(Default)]
struct Outcome {
    steps_completed: usize,
    interface_size: usize,
    max_error: f64,
    metrics: ScenarioMetrics,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    config: SimConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!(
            "Starting scenario: {} (seed={}, transport={})",
            scenario.name(),
            self.config.seed,
            self.config.transport
        );

        let outcome = match scenario {
            ScenarioId::LinearChain => self.run_linear_chain(),
            ScenarioId::HardeningChain => self.run_hardening_chain(),
            ScenarioId::TrussBridge => self.run_truss_bridge(),
            ScenarioId::EmptyInterface => self.run_empty_interface(),
            ScenarioId::SeveredWorker => self.run_severed_worker(),
            ScenarioId::DomainEdit => self.run_domain_edit(),
        };

        match outcome {
            Ok(outcome) => {
                let mut failure = None;
                if outcome.max_error > DISP_TOLERANCE {
                    failure = Some(format!(
                        "displacement error {:.3e} exceeds {:.0e}",
                        outcome.max_error, DISP_TOLERANCE
                    ));
                }
                ScenarioResult {
                    scenario,
                    seed: self.config.seed,
                    passed: failure.is_none(),
                    steps_completed: outcome.steps_completed,
                    interface_size: outcome.interface_size,
                    max_error: outcome.max_error,
                    failure_reason: failure,
                    metrics: outcome.metrics,
                }
            }
            Err(err) => {
                warn!("{} failed: {}", scenario.name(), err);
                ScenarioResult {
                    scenario,
                    seed: self.config.seed,
                    passed: false,
                    steps_completed: 0,
                    interface_size: 0,
                    max_error: f64::NAN,
                    failure_reason: Some(err.to_string()),
                    metrics: ScenarioMetrics::default(),
                }
            }
        }
    }

    fn generator(&self) -> ModelGenerator {
        ModelGenerator::new(self.config.seed)
    }

    fn parts_for(&self, model: &ModelDescription) -> usize {
        self.config.num_subdomains.clamp(1, model.elements.len().max(1))
    }

    /// DDM-001: LinearChain
    ///
    /// **Assertion**: every displacement within tolerance of the oracle, each
    /// step converged after one interface correction.
    fn run_linear_chain(&self) -> SimResult<Outcome> {
        let model = self.generator().spring_chain(4 * self.config.num_subdomains.max(1), false);
        let parts = self.parts_for(&model);
        let outcome = self.compare(&model, parts, self.config.analysis.clone(), None)?;
        if outcome.metrics.max_iterations != 1 {
            return Err(SimError::Engine(DdError::invalid_state(format!(
                "linear problem needed {} interface iterations",
                outcome.metrics.max_iterations
            ))));
        }
        Ok(outcome)
    }

    /// DDM-002: HardeningChain
    fn run_hardening_chain(&self) -> SimResult<Outcome> {
        let model = self.generator().spring_chain(4 * self.config.num_subdomains.max(1), true);
        let parts = self.parts_for(&model);
        let analysis = AnalysisConfig {
            algorithm: AlgorithmKind::Newton,
            ..self.config.analysis.clone()
        };
        self.compare(&model, parts, analysis, None)
    }

    /// DDM-003: TrussBridge
    fn run_truss_bridge(&self) -> SimResult<Outcome> {
        let model = self.generator().truss_bridge(2 * self.config.num_subdomains.max(1));
        let parts = self.parts_for(&model);
        self.compare(&model, parts, self.config.analysis.clone(), None)
    }

    /// DDM-004: EmptyInterface
    ///
    /// **Assertion**: zero interface equations, solve still matches.
    fn run_empty_interface(&self) -> SimResult<Outcome> {
        let model = self.generator().spring_chain(6, false);
        let outcome = self.compare(&model, 1, self.config.analysis.clone(), None)?;
        if outcome.interface_size != 0 {
            return Err(SimError::Engine(DdError::invalid_state(format!(
                "single subdomain reported {} interface equations",
                outcome.interface_size
            ))));
        }
        Ok(outcome)
    }

    /// DDM-006: DomainEdit
    ///
    /// After the first step one spring is swapped for a stiffer one through
    /// the subdomain interface; the worker's analysis must notice the mesh
    /// change and rebuild.
    fn run_domain_edit(&self) -> SimResult<Outcome> {
        let model = self.generator().spring_chain(4 * self.config.num_subdomains.max(1), false);
        let parts = self.parts_for(&model);
        let tag = (model.elements.len() / 2) as i32 + 1;
        let edit = EditPlan {
            after_step: 1,
            element: Box::new(Spring1D::new(tag, tag, tag + 1, 250.0)),
        };
        self.compare(&model, parts, self.config.analysis.clone(), Some(edit))
    }

    /// DDM-005: SeveredWorker
    ///
    /// **Assertion**: the step during which the link dies fails with a
    /// transport error, later steps fail fast, the severed worker ends with
    /// an error and every other worker exits cleanly.
    fn run_severed_worker(&self) -> SimResult<Outcome> {
        let model = self.generator().spring_chain(8, false);
        let parts = self.config.num_subdomains.clamp(2, model.elements.len());
        let blueprints = Partitioner::new(parts).by_element_order(&model)?;
        let mut world = SimWorld::launch(&self.config, blueprints)?;

        let checked = Self::sever_during_step(&mut world);
        let interface_size = world.driver().interface_size();
        let outcomes = world.shutdown();
        let steps_completed = checked?;

        let mut metrics = ScenarioMetrics::default();
        for (index, outcome) in outcomes.iter().enumerate() {
            match (index, &outcome.result) {
                (0, Ok(_)) => {
                    return Err(SimError::Engine(DdError::invalid_state(
                        "severed worker exited as if terminated",
                    )))
                }
                (0, Err(_)) => metrics.workers_failed += 1,
                (_, Ok(_)) => metrics.workers_clean += 1,
                (_, Err(err)) => {
                    return Err(SimError::Engine(DdError::invalid_state(format!(
                        "healthy worker {} failed: {}",
                        outcome.tag, err
                    ))))
                }
            }
        }

        Ok(Outcome {
            steps_completed,
            interface_size,
            max_error: 0.0,
            metrics,
        })
    }

    fn sever_during_step(world: &mut SimWorld) -> SimResult<usize> {
        world.driver_mut().solve_step()?;

        let link = world
            .link(0)
            .cloned()
            .ok_or_else(|| SimError::config("no link to sever"))?;
        link.sever_after(3);

        match world.driver_mut().solve_step() {
            Err(err) if err.is_transport() => debug!("step failed as expected: {}", err),
            Err(err) => return Err(err.into()),
            Ok(_) => {
                return Err(SimError::Engine(DdError::invalid_state(
                    "step succeeded over a severed link",
                )))
            }
        }
        match world.driver_mut().solve_step() {
            Err(DdError::Poisoned(_)) => {}
            Err(err) => return Err(err.into()),
            Ok(_) => {
                return Err(SimError::Engine(DdError::invalid_state(
                    "poisoned shadow accepted a step",
                )))
            }
        }
        Ok(1)
    }

    /// Runs the decomposed analysis and the oracle side by side.
    fn compare(
        &self,
        model: &ModelDescription,
        parts: usize,
        analysis: AnalysisConfig,
        edit: Option<EditPlan>,
    ) -> SimResult<Outcome> {
        let config = SimConfig {
            analysis,
            ..self.config.clone()
        };
        let blueprints = Partitioner::new(parts).by_element_order(model)?;
        let mut oracle = Oracle::new(model)?;
        let mut world = SimWorld::launch(&config, blueprints)?;

        let driven = Self::drive(&config, &mut world, &mut oracle, edit);
        let interface_size = world.driver().interface_size();
        let workers = world.shutdown();
        let mut outcome = driven?;

        outcome.interface_size = interface_size;
        Self::count_workers(&workers, &mut outcome.metrics)?;
        Ok(outcome)
    }

    fn drive(
        config: &SimConfig,
        world: &mut SimWorld,
        oracle: &mut Oracle,
        mut edit: Option<EditPlan>,
    ) -> SimResult<Outcome> {
        let delta_lambda = config.analysis.integrator.delta_lambda;
        let mut outcome = Outcome::default();

        for step in 1..=config.steps {
            if edit.as_ref().is_some_and(|e| e.after_step + 1 == step) {
                if let Some(plan) = edit.take() {
                    Self::apply_edit(world, oracle, plan)?;
                }
            }

            let report = world.driver_mut().solve_step()?;
            oracle.solve_to(step as f64 * delta_lambda)?;

            let error = Self::max_error(world, oracle)?;
            debug!(step, iterations = report.iterations, error, "step checked");
            outcome.max_error = outcome.max_error.max(error);
            outcome.steps_completed = step;
            outcome.metrics.total_iterations += report.iterations;
            outcome.metrics.max_iterations = outcome.metrics.max_iterations.max(report.iterations);
        }
        Ok(outcome)
    }

    fn apply_edit(world: &mut SimWorld, oracle: &mut Oracle, plan: EditPlan) -> SimResult<()> {
        let tag = plan.element.tag();
        let mut replaced = false;
        for subdomain in world.driver_mut().subdomains_mut() {
            if subdomain.has_element(tag)? {
                subdomain.remove_element(tag)?;
                subdomain.add_element(plan.element.clone())?;
                replaced = true;
                info!(subdomain = subdomain.tag(), element = tag, "element replaced");
                break;
            }
        }
        if !replaced {
            return Err(DdError::UnknownElement(tag).into());
        }
        oracle.replace_element(plan.element)?;
        Ok(())
    }

    fn max_error(world: &mut SimWorld, oracle: &Oracle) -> SimResult<f64> {
        let mut worst: f64 = 0.0;
        let mut scale: f64 = 1.0;
        for (node, dof) in oracle.dofs() {
            let expected = oracle.disp(node, dof)?;
            let actual = world.driver_mut().node_disp(node, dof)?;
            worst = worst.max((actual - expected).abs());
            scale = scale.max(expected.abs());
        }
        Ok(worst / scale)
    }

    fn count_workers(workers: &[WorkerOutcome], metrics: &mut ScenarioMetrics) -> SimResult<()> {
        for worker in workers {
            match &worker.result {
                Ok(_) => metrics.workers_clean += 1,
                Err(err) => {
                    metrics.workers_failed += 1;
                    warn!(worker = worker.tag, "worker failed: {}", err);
                }
            }
        }
        if metrics.workers_failed > 0 {
            return Err(SimError::Engine(DdError::invalid_state(format!(
                "{} worker(s) did not exit cleanly",
                metrics.workers_failed
            ))));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(seed: u64) -> ScenarioRunner {
        ScenarioRunner::new(SimConfig {
            seed,
            ..Default::default()
        })
    }

    #[test]
    fn test_linear_chain_scenario() {
        let result = runner(42).run(ScenarioId::LinearChain);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.steps_completed, 3);
        assert_eq!(result.interface_size, 2);
    }

    #[test]
    fn test_empty_interface_scenario() {
        let result = runner(7).run(ScenarioId::EmptyInterface);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.interface_size, 0);
    }

    #[test]
    fn test_severed_worker_scenario() {
        let result = runner(3).run(ScenarioId::SeveredWorker);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.metrics.workers_failed, 1);
        assert_eq!(result.metrics.workers_clean, 2);
    }
}
