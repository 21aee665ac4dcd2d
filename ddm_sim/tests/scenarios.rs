//! End-to-end scenario runs over both transports.

use approx::assert_relative_eq;
use ddm_core::{AlgorithmKind, AnalysisConfig, Partitioner};
use ddm_sim::scenarios::ScenarioId;
use ddm_sim::{ModelGenerator, Oracle, ScenarioRunner, SimConfig, SimWorld, Transport};
use proptest::prelude::*;

fn config(seed: u64, transport: Transport) -> SimConfig {
    SimConfig {
        seed,
        transport,
        ..Default::default()
    }
}

#[test]
fn test_all_scenarios_over_memory() {
    let runner = ScenarioRunner::new(config(11, Transport::Memory));
    for scenario in ScenarioId::all() {
        let result = runner.run(scenario);
        assert!(result.passed, "{}: {:?}", scenario, result.failure_reason);
    }
}

#[test]
fn test_hardening_chain_over_tcp() {
    let runner = ScenarioRunner::new(config(5, Transport::Tcp));
    let result = runner.run(ScenarioId::HardeningChain);
    assert!(result.passed, "{:?}", result.failure_reason);
    assert!(result.metrics.max_iterations > 1);
    assert_eq!(result.metrics.workers_clean, 3);
}

#[test]
fn test_severed_worker_over_tcp() {
    let runner = ScenarioRunner::new(config(5, Transport::Tcp));
    let result = runner.run(ScenarioId::SeveredWorker);
    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.metrics.workers_failed, 1);
}

#[test]
fn test_truss_interface_carries_two_dofs_per_node() {
    let model = ModelGenerator::new(3).truss_bridge(4);
    let blueprints = Partitioner::new(2).by_element_order(&model).unwrap();
    let shared = blueprints[0].external_nodes.len();

    let world = SimWorld::launch(&SimConfig::default(), blueprints).unwrap();
    assert_eq!(world.driver().interface_size(), 2 * shared);
    assert!(world.shutdown().iter().all(|o| o.result.is_ok()));
}

#[test]
fn test_oracle_agrees_with_single_worker() {
    let model = ModelGenerator::new(21).spring_chain(5, true);
    let mut oracle = Oracle::new(&model).unwrap();
    oracle.solve_to(1.0).unwrap();

    let config = SimConfig {
        analysis: AnalysisConfig {
            algorithm: AlgorithmKind::Newton,
            ..Default::default()
        },
        ..Default::default()
    };
    let blueprints = Partitioner::new(1).by_element_order(&model).unwrap();
    let mut world = SimWorld::launch(&config, blueprints).unwrap();
    world.driver_mut().solve_step().unwrap();

    let tip = oracle.disp(6, 0).unwrap();
    let decomposed = world.driver_mut().node_disp(6, 0).unwrap();
    assert_relative_eq!(tip, decomposed, epsilon = 1e-10, max_relative = 1e-8);
    world.shutdown();
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_hardening_chain_matches_oracle(seed in 1u64..10_000, parts in 1usize..5) {
        let runner = ScenarioRunner::new(SimConfig {
            seed,
            num_subdomains: parts,
            steps: 2,
            ..Default::default()
        });
        let result = runner.run(ScenarioId::HardeningChain);
        prop_assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
    }
}
