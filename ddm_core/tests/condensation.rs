//! Condensed interface problem versus the undivided system.

use approx::assert_relative_eq;
use ddm_core::model::{LoadPattern, NodalLoad, Node, SpConstraint, Spring1D, TimeSeries};
use ddm_core::{
    AlgorithmKind, AnalysisConfig, DomainDecompositionDriver, DriverConfig, LocalSubdomain, ModelDescription,
    Partitioner, Subdomain,
};
use nalgebra::{DMatrix, DVector};
use proptest::prelude::*;

const STIFFNESS: [f64; 4] = [1.0, 2.0, 3.0, 4.0];

/// Nodes 1..=5 joined by springs of stiffness 1, 2, 3, 4; node 1 fixed,
/// unit load on node 5.
fn chain() -> ModelDescription {
    let mut model = ModelDescription::default();
    for tag in 1..=5 {
        model.nodes.push(Node::new(tag, 1, vec![tag as f64]));
    }
    for (i, k) in STIFFNESS.iter().enumerate() {
        let tag = i as i32 + 1;
        model
            .elements
            .push(Box::new(Spring1D::new(tag, tag, tag + 1, *k)));
    }
    model.sp_constraints.push(SpConstraint::fixed(1, 1, 0));
    model.load_patterns.push(
        LoadPattern::new(1, TimeSeries::Linear { factor: 1.0 })
            .with_nodal_load(NodalLoad::new(1, 5, vec![1.0])),
    );
    model
}

/// Stiffness of the free dofs (nodes 2..=5) and the load vector.
fn direct_system() -> (DMatrix<f64>, DVector<f64>) {
    let mut k = DMatrix::zeros(5, 5);
    for (i, s) in STIFFNESS.iter().enumerate() {
        k[(i, i)] += s;
        k[(i + 1, i + 1)] += s;
        k[(i, i + 1)] -= s;
        k[(i + 1, i)] -= s;
    }
    let free = k.view((1, 1), (4, 4)).into_owned();
    let f = DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
    (free, f)
}

fn local_subdomains(parts: usize) -> Vec<LocalSubdomain> {
    let blueprints = Partitioner::new(parts).by_element_order(&chain()).unwrap();
    blueprints
        .iter()
        .map(|bp| LocalSubdomain::from_blueprint(bp, &AnalysisConfig::default()).unwrap())
        .collect()
}

#[test]
fn test_schur_identity_two_subdomains() {
    let mut subdomains = local_subdomains(2);

    let mut s = 0.0;
    let mut g = 0.0;
    for subdomain in &mut subdomains {
        subdomain.new_step(1.0).unwrap();
        subdomain.compute_tang().unwrap();
        subdomain.compute_residual().unwrap();
        let remote = subdomain.get_remote_data().unwrap();
        assert_eq!(remote.interface, vec![(3, 0)]);
        s += subdomain.get_tang().unwrap()[(0, 0)];
        g += subdomain.get_resisting_force().unwrap()[0];
    }

    // node 3 is row 1 of the free system; the rest is condensed away
    let (k, f) = direct_system();
    let others = [0usize, 2, 3];
    let k_oo = k.select_rows(others.iter()).select_columns(others.iter());
    let k_o3 = k.select_rows(others.iter()).column(1).into_owned();
    let f_o = f.select_rows(others.iter());
    let lu = k_oo.lu();
    let s_direct = k[(1, 1)] - k_o3.dot(&lu.solve(&k_o3).unwrap());
    let g_direct = f[1] - k_o3.dot(&lu.solve(&f_o).unwrap());

    assert_relative_eq!(s, s_direct, epsilon = 1e-12);
    assert_relative_eq!(g, g_direct, epsilon = 1e-12);
}

#[test]
fn test_driver_matches_direct_solve() {
    let (k, f) = direct_system();
    let direct = k.lu().solve(&f).unwrap();

    for parts in 1..=4 {
        let subdomains: Vec<Box<dyn Subdomain>> = local_subdomains(parts)
            .into_iter()
            .map(|s| Box::new(s) as Box<dyn Subdomain>)
            .collect();
        let mut driver = DomainDecompositionDriver::new(subdomains, DriverConfig::default());
        let report = driver.solve_step().unwrap();
        assert_eq!(report.step, 1);
        assert_eq!(report.iterations, 1);

        for node in 2..=5 {
            let u = driver.node_disp(node, 0).unwrap();
            assert_relative_eq!(u, direct[(node - 2) as usize], epsilon = 1e-9);
        }
    }
}

#[test]
fn test_hardening_chain_converges() {
    let mut model = chain();
    for element in model.elements.iter_mut() {
        let tag = element.tag();
        *element = Box::new(Spring1D::new(tag, tag, tag + 1, 10.0).with_hardening(5.0));
    }
    let config = AnalysisConfig {
        algorithm: AlgorithmKind::Newton,
        ..Default::default()
    };
    let blueprints = Partitioner::new(2).by_element_order(&model).unwrap();
    let subdomains: Vec<Box<dyn Subdomain>> = blueprints
        .iter()
        .map(|bp| {
            Box::new(LocalSubdomain::from_blueprint(bp, &config).unwrap()) as Box<dyn Subdomain>
        })
        .collect();

    let mut driver = DomainDecompositionDriver::new(subdomains, DriverConfig::default());
    let reports = driver.analyze(3).unwrap();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().any(|r| r.iterations > 1));

    // every spring carries the full load: 10 d + 5 d^3 = 3
    let u5 = driver.node_disp(5, 0).unwrap();
    let u4 = driver.node_disp(4, 0).unwrap();
    let d = u5 - u4;
    assert_relative_eq!(10.0 * d + 5.0 * d * d * d, 3.0, epsilon = 1e-6);
}

#[test]
fn test_interface_shared_between_subdomains() {
    let subdomains: Vec<Box<dyn Subdomain>> = local_subdomains(4)
        .into_iter()
        .map(|s| Box::new(s) as Box<dyn Subdomain>)
        .collect();
    let mut driver = DomainDecompositionDriver::new(subdomains, DriverConfig::default());
    driver.setup().unwrap();

    // nodes 2, 3 and 4 each sit between two subdomains
    assert_eq!(driver.interface_size(), 3);
    assert!(driver.interface_equation(2, 0).is_some());
    assert!(driver.interface_equation(5, 0).is_none());
}

proptest! {
    #[test]
    fn prop_external_plus_internal_is_total(
        assignment in proptest::collection::vec(0usize..3, 4),
    ) {
        let model = chain();
        let blueprints = Partitioner::new(3).partition(&model, &assignment).unwrap();
        for bp in &blueprints {
            let mut subdomain =
                LocalSubdomain::from_blueprint(bp, &AnalysisConfig::default()).unwrap();
            let remote = subdomain.get_remote_data().unwrap();
            let analysis = subdomain.analysis().unwrap();
            prop_assert_eq!(
                analysis.num_external_eqn() + analysis.num_internal_eqn(),
                analysis.num_eqn()
            );
            prop_assert_eq!(remote.num_external_eqn(), analysis.num_external_eqn());
            prop_assert_eq!(analysis.num_external_eqn(), bp.external_nodes.len());
        }
    }
}
