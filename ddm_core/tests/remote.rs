//! Shadow/actor pairs over in-memory channels.

use approx::assert_relative_eq;
use ddm_core::model::{LoadPattern, NodalLoad, Node, SpConstraint, Spring1D, TimeSeries};
use ddm_core::subdomain::{Reply, Request, REQUEST_DB_TAG};
use ddm_core::{
    ActorExit, ActorSubdomain, AnalysisConfig, DdError, DdResult, DomainDecompositionDriver,
    DriverConfig, LocalSubdomain, ModelDescription, ObjectBroker, Opcode, Partitioner,
    ShadowSubdomain, Subdomain, SubdomainBlueprint,
};
use ddm_env::{memory_pair, Channel, MemoryChannel};
use nalgebra::{DMatrix, DVector};
use std::thread::{self, JoinHandle};

type Worker = JoinHandle<DdResult<ActorExit>>;

fn spawn_actor(tag: i32) -> (ShadowSubdomain<MemoryChannel>, Worker) {
    let (coordinator, worker) = memory_pair(0, tag);
    let handle = thread::spawn(move || ActorSubdomain::new(worker, LocalSubdomain::new(tag)).run());
    (ShadowSubdomain::new(tag, coordinator), handle)
}

/// Worker that reports a two-dof interface (nodes 7 and 8) and answers the
/// condensed queries with fixed replies. Returns the opcodes it saw.
fn spawn_scripted_worker(
    tangent: DMatrix<f64>,
    residual: DVector<f64>,
) -> (ShadowSubdomain<MemoryChannel>, JoinHandle<Vec<Opcode>>) {
    let (coordinator, mut worker) = memory_pair(0, 1);
    let handle = thread::spawn(move || {
        let broker = ObjectBroker::default();
        let mut seen = Vec::new();
        while let Ok(header) = worker.recv_id(REQUEST_DB_TAG) {
            let request = Request::decode(&header, &mut worker, &broker).unwrap();
            let op = request.opcode();
            seen.push(op);
            let reply = match op {
                Opcode::Die => break,
                Opcode::GetRemoteData => Reply::Id(vec![2, 7, 0, 8, 0]),
                Opcode::GetTang => Reply::Matrix(tangent.clone()),
                Opcode::GetResistingForce => Reply::Vector(residual.clone()),
                _ => Reply::Done,
            };
            reply.send(&mut worker, 0).unwrap();
        }
        seen
    });
    (ShadowSubdomain::new(1, coordinator), handle)
}

/// Springs of stiffness 10 between nodes 1..=5, node 1 fixed, unit load on 5.
fn chain() -> ModelDescription {
    let mut model = ModelDescription::default();
    for tag in 1..=5 {
        model.nodes.push(Node::new(tag, 1, vec![tag as f64]));
    }
    for tag in 1..=4 {
        model
            .elements
            .push(Box::new(Spring1D::new(tag, tag, tag + 1, 10.0)));
    }
    model.sp_constraints.push(SpConstraint::fixed(1, 1, 0));
    model.load_patterns.push(
        LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 })
            .with_nodal_load(NodalLoad::new(1, 5, vec![1.0])),
    );
    model
}

fn blueprints(parts: usize) -> Vec<SubdomainBlueprint> {
    Partitioner::new(parts).by_element_order(&chain()).unwrap()
}

fn prepare(subdomain: &mut dyn Subdomain, blueprint: SubdomainBlueprint) {
    subdomain.build_subdomain(blueprint).unwrap();
    subdomain
        .set_domain_decomp_analysis(AnalysisConfig::default())
        .unwrap();
    subdomain.new_step(1.0).unwrap();
}

#[test]
fn test_terminate_ends_actor_cleanly() {
    let (mut shadow, worker) = spawn_actor(1);
    shadow.add_node(Node::new(1, 1, vec![0.0])).unwrap();
    assert!(shadow.has_node(1).unwrap());
    shadow.terminate().unwrap();

    let exit = worker.join().unwrap().unwrap();
    assert_eq!(
        exit,
        ActorExit {
            tag: 1,
            requests_served: 2
        }
    );
}

#[test]
fn test_dropping_shadow_releases_actor() {
    let (shadow, worker) = spawn_actor(4);
    drop(shadow);
    let exit = worker.join().unwrap().unwrap();
    assert_eq!(exit.tag, 4);
    assert_eq!(exit.requests_served, 0);
}

#[test]
fn test_unknown_opcode_aborts_actor() {
    let (mut coordinator, worker) = memory_pair(0, 1);
    let handle = thread::spawn(move || ActorSubdomain::new(worker, LocalSubdomain::new(1)).run());

    coordinator.send_id(REQUEST_DB_TAG, 0, &[9999]).unwrap();
    let result = handle.join().unwrap();
    assert!(matches!(result, Err(DdError::UnknownOpcode(9999))));
}

#[test]
fn test_remote_failure_surfaces_as_status() {
    let (mut shadow, worker) = spawn_actor(2);

    // no analysis installed on the worker yet
    let err = shadow.compute_tang().unwrap_err();
    match err {
        DdError::Remote { opcode, status } => {
            assert_eq!(opcode, Opcode::ComputeTang);
            assert_eq!(status, DdError::NoAnalysis(2).status_code());
        }
        other => panic!("unexpected error {other:?}"),
    }

    // element on missing nodes
    let err = shadow
        .add_element(Box::new(Spring1D::new(1, 1, 2, 1.0)))
        .unwrap_err();
    assert!(matches!(
        err,
        DdError::Remote {
            opcode: Opcode::AddElement,
            ..
        }
    ));

    // the stream is still in step
    assert!(!shadow.is_poisoned());
    assert!(!shadow.has_node(7).unwrap());

    shadow.terminate().unwrap();
    assert!(worker.join().unwrap().is_ok());
}

#[test]
fn test_transport_failure_poisons_shadow() {
    let (coordinator, worker) = memory_pair(0, 3);
    drop(worker);
    let mut shadow = ShadowSubdomain::new(3, coordinator);

    let err = shadow.has_node(1).unwrap_err();
    assert!(matches!(err, DdError::Channel(_)));
    assert!(shadow.is_poisoned());
    assert!(matches!(shadow.has_node(1), Err(DdError::Poisoned(3))));
    assert!(err.is_transport());
}

#[test]
fn test_shadow_cache_avoids_round_trips() {
    let (mut shadow, worker) = spawn_actor(2);
    let blueprint = blueprints(2).remove(1);
    prepare(&mut shadow, blueprint);

    shadow.compute_tang().unwrap();
    shadow.compute_residual().unwrap();
    let tangent = shadow.get_tang().unwrap();
    let residual = shadow.get_resisting_force().unwrap();
    let trips = shadow.round_trips();

    shadow.compute_tang().unwrap();
    shadow.compute_residual().unwrap();
    assert_eq!(shadow.get_tang().unwrap(), tangent);
    assert_eq!(shadow.get_resisting_force().unwrap(), residual);
    assert_eq!(shadow.round_trips(), trips);

    // a state change makes the cache stale
    shadow
        .compute_nodal_response(&DVector::from_element(tangent.nrows(), 0.0))
        .unwrap();
    shadow.compute_tang().unwrap();
    assert_eq!(shadow.round_trips(), trips + 2);

    shadow.terminate().unwrap();
    worker.join().unwrap().unwrap();
}

#[test]
fn test_shadow_agrees_with_local() {
    let (mut shadow, worker) = spawn_actor(2);
    let mut local = LocalSubdomain::new(2);
    let blueprint = blueprints(2).remove(1);
    prepare(&mut shadow, blueprint.clone());
    prepare(&mut local, blueprint);

    assert_eq!(
        shadow.get_remote_data().unwrap(),
        local.get_remote_data().unwrap()
    );
    shadow.compute_tang().unwrap();
    local.compute_tang().unwrap();
    shadow.compute_residual().unwrap();
    local.compute_residual().unwrap();
    assert_eq!(shadow.get_tang().unwrap(), local.get_tang().unwrap());
    assert_eq!(
        shadow.get_resisting_force().unwrap(),
        local.get_resisting_force().unwrap()
    );

    let delta = DVector::from_vec(vec![0.25]);
    shadow.compute_nodal_response(&delta).unwrap();
    local.compute_nodal_response(&delta).unwrap();
    for node in 3..=5 {
        assert_relative_eq!(
            shadow.get_node_disp(node, 0).unwrap(),
            local.get_node_disp(node, 0).unwrap(),
            epsilon = 1e-14
        );
    }

    let element = shadow.get_element(4).unwrap().unwrap();
    assert_eq!(element.tag(), 4);
    assert_eq!(element.connected_nodes(), &[4, 5]);
    assert!(shadow.get_element(1).unwrap().is_none());
    assert_eq!(shadow.get_node(5).unwrap(), local.get_node(5).unwrap());

    assert!(shadow.print().unwrap().starts_with("Subdomain 2"));
    assert!(shadow.get_cost().unwrap() >= 0.0);

    let removed = shadow.remove_element(4).unwrap().unwrap();
    assert_eq!(removed.tag(), 4);
    assert!(!shadow.has_element(4).unwrap());
    assert!(shadow.remove_element(4).unwrap().is_none());

    shadow.terminate().unwrap();
    worker.join().unwrap().unwrap();
}

#[test]
fn test_driver_over_memory_channels() {
    let mut workers = Vec::new();
    let mut subdomains: Vec<Box<dyn Subdomain>> = Vec::new();
    for blueprint in blueprints(2) {
        let (mut shadow, worker) = spawn_actor(blueprint.tag);
        shadow.build_subdomain(blueprint).unwrap();
        shadow
            .set_domain_decomp_analysis(AnalysisConfig::default())
            .unwrap();
        subdomains.push(Box::new(shadow));
        workers.push(worker);
    }

    let mut driver = DomainDecompositionDriver::new(subdomains, DriverConfig::default());
    let reports = driver.analyze(2).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(driver.interface_size(), 1);

    // four springs of 10 in series under a load of 2
    assert_relative_eq!(driver.node_disp(5, 0).unwrap(), 0.8, epsilon = 1e-9);
    assert_relative_eq!(driver.node_disp(3, 0).unwrap(), 0.4, epsilon = 1e-9);

    drop(driver);
    for worker in workers {
        assert!(worker.join().unwrap().is_ok());
    }
}

#[test]
fn test_non_square_tangent_fails_the_step() {
    let (shadow, worker) = spawn_scripted_worker(DMatrix::zeros(2, 1), DVector::zeros(2));
    let mut driver = DomainDecompositionDriver::new(vec![Box::new(shadow)], DriverConfig::default());

    let result = driver.solve_step();
    assert!(matches!(result, Err(DdError::Malformed(_))), "{result:?}");

    drop(driver);
    let seen = worker.join().unwrap();
    assert!(seen.contains(&Opcode::RevertToLastCommit));
}

#[test]
fn test_residual_must_fit_interface() {
    let (mut shadow, worker) =
        spawn_scripted_worker(DMatrix::identity(2, 2), DVector::zeros(3));

    assert_eq!(shadow.get_remote_data().unwrap().num_external_eqn(), 2);
    assert!(matches!(
        shadow.get_resisting_force(),
        Err(DdError::Malformed(_))
    ));

    // the reply was consumed whole, the stream is still in step
    assert!(!shadow.is_poisoned());
    assert_eq!(shadow.get_tang().unwrap(), DMatrix::identity(2, 2));

    shadow.terminate().unwrap();
    worker.join().unwrap();
}

/// Checks that `call` makes the next tangent and residual queries go back to
/// the worker, and that without it they are served from the cache.
fn assert_call_drops_cache(call: impl FnOnce(&mut ShadowSubdomain<MemoryChannel>) -> DdResult<()>) {
    let (mut shadow, worker) = spawn_actor(2);
    prepare(&mut shadow, blueprints(2).remove(1));

    let tangent = shadow.get_tang().unwrap();
    shadow.get_resisting_force().unwrap();
    let trips = shadow.round_trips();

    assert_eq!(shadow.get_tang().unwrap(), tangent);
    shadow.get_resisting_force().unwrap();
    assert_eq!(shadow.round_trips(), trips);

    call(&mut shadow).unwrap();
    assert_eq!(shadow.round_trips(), trips + 1);

    shadow.get_tang().unwrap();
    shadow.get_resisting_force().unwrap();
    assert_eq!(shadow.round_trips(), trips + 3);

    shadow.terminate().unwrap();
    worker.join().unwrap().unwrap();
}

#[test]
fn test_update_drops_shadow_cache() {
    assert_call_drops_cache(|shadow| shadow.update());
}

#[test]
fn test_commit_drops_shadow_cache() {
    assert_call_drops_cache(|shadow| shadow.commit());
}

#[test]
fn test_revert_drops_shadow_cache() {
    assert_call_drops_cache(|shadow| shadow.revert_to_last_commit());
}

#[test]
fn test_new_step_drops_shadow_cache() {
    assert_call_drops_cache(|shadow| shadow.new_step(1.0));
}
