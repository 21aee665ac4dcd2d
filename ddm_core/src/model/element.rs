//! Element interface and the two formulations shipped with the engine.
//!
//! Element technology is not what this crate is about; `Spring1D` and
//! `Truss2D` exist so the condensation machinery has something real to
//! assemble. Both are Movable and reach workers through the broker.

use ddm_env::Movable;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{DdError, DdResult};
use crate::model::node::Node;

/// Nodes of a domain, keyed by tag.
pub type NodeMap = BTreeMap<i32, Node>;

/// Rayleigh damping factors (stored for dynamic integrators).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RayleighFactors {
    pub alpha_m: f64,
    pub beta_k: f64,
    pub beta_k0: f64,
    pub beta_kc: f64,
}

impl RayleighFactors {
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.alpha_m, self.beta_k, self.beta_k0, self.beta_kc]
    }

    pub fn from_slice(values: &[f64]) -> DdResult<Self> {
        match values {
            [alpha_m, beta_k, beta_k0, beta_kc] => Ok(Self {
                alpha_m: *alpha_m,
                beta_k: *beta_k,
                beta_k0: *beta_k0,
                beta_kc: *beta_kc,
            }),
            _ => Err(DdError::malformed(format!(
                "rayleigh factors need 4 values, got {}",
                values.len()
            ))),
        }
    }
}

/// A finite element as seen by the analysis.
///
/// Local DOF ordering is node-major: all DOFs of the first connected node,
/// then the second, and so on.
pub trait Element: Movable + Send + fmt::Debug {
    fn tag(&self) -> i32;

    fn connected_nodes(&self) -> &[i32];

    /// DOFs the element uses at each connected node.
    fn dofs_per_node(&self) -> usize;

    fn num_dof(&self) -> usize {
        self.connected_nodes().len() * self.dofs_per_node()
    }

    /// Tangent stiffness at the nodes' trial displacements.
    fn tangent_stiff(&self, nodes: &NodeMap) -> DdResult<DMatrix<f64>>;

    /// Internal force minus applied element loads.
    fn resisting_force(&self, nodes: &NodeMap) -> DdResult<DVector<f64>>;

    fn zero_load(&mut self);

    /// Adds `factor * load` (element-local DOF ordering) to the element load.
    fn add_load(&mut self, load: &[f64], factor: f64) -> DdResult<()>;

    fn set_rayleigh_damping_factors(&mut self, factors: RayleighFactors);

    fn clone_box(&self) -> Box<dyn Element>;
}

impl Clone for Box<dyn Element> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Gathers the element displacement vector from its nodes.
fn element_disp(nodes: &NodeMap, connected: &[i32], dofs_per_node: usize) -> DdResult<DVector<f64>> {
    let mut u = DVector::zeros(connected.len() * dofs_per_node);
    for (i, tag) in connected.iter().enumerate() {
        let node = nodes.get(tag).ok_or(DdError::UnknownNode(*tag))?;
        if node.ndf() != dofs_per_node {
            return Err(DdError::invalid_model(format!(
                "node {} has {} dofs, element expects {}",
                tag,
                node.ndf(),
                dofs_per_node
            )));
        }
        u.rows_mut(i * dofs_per_node, dofs_per_node)
            .copy_from(node.trial_disp());
    }
    Ok(u)
}

fn accumulate_load(acc: &mut Vec<f64>, size: usize, load: &[f64], factor: f64) -> DdResult<()> {
    if load.len() != size {
        return Err(DdError::invalid_model(format!(
            "element load of size {}, element has {} dofs",
            load.len(),
            size
        )));
    }
    if acc.len() != size {
        acc.resize(size, 0.0);
    }
    for (a, l) in acc.iter_mut().zip(load) {
        *a += factor * l;
    }
    Ok(())
}

fn subtract_load(mut force: DVector<f64>, load: &[f64]) -> DVector<f64> {
    for (f, l) in force.iter_mut().zip(load) {
        *f -= l;
    }
    force
}

// ============================================================================
// SPRING 1D
// ============================================================================

/// Axial spring between two 1-DOF nodes.
///
/// Force law `f = k·d + k3·d³` with `d = u_j - u_i`; `k3 = 0` gives a linear
/// spring, `k3 > 0` a hardening one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spring1D {
    pub tag: i32,
    pub nodes: [i32; 2],
    pub k: f64,
    pub k3: f64,
    pub rayleigh: RayleighFactors,
    #[serde(skip)]
    load: Vec<f64>,
}

impl Spring1D {
    pub fn new(tag: i32, node_i: i32, node_j: i32, k: f64) -> Self {
        Self {
            tag,
            nodes: [node_i, node_j],
            k,
            ..Default::default()
        }
    }

    /// Sets the cubic hardening coefficient.
    pub fn with_hardening(mut self, k3: f64) -> Self {
        self.k3 = k3;
        self
    }

    fn deformation(&self, nodes: &NodeMap) -> DdResult<f64> {
        let u = element_disp(nodes, &self.nodes, 1)?;
        Ok(u[1] - u[0])
    }
}

impl Element for Spring1D {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn connected_nodes(&self) -> &[i32] {
        &self.nodes
    }

    fn dofs_per_node(&self) -> usize {
        1
    }

    fn tangent_stiff(&self, nodes: &NodeMap) -> DdResult<DMatrix<f64>> {
        let d = self.deformation(nodes)?;
        let kt = self.k + 3.0 * self.k3 * d * d;
        Ok(DMatrix::from_row_slice(2, 2, &[kt, -kt, -kt, kt]))
    }

    fn resisting_force(&self, nodes: &NodeMap) -> DdResult<DVector<f64>> {
        let d = self.deformation(nodes)?;
        let f = self.k * d + self.k3 * d * d * d;
        Ok(subtract_load(DVector::from_vec(vec![-f, f]), &self.load))
    }

    fn zero_load(&mut self) {
        self.load.clear();
    }

    fn add_load(&mut self, load: &[f64], factor: f64) -> DdResult<()> {
        accumulate_load(&mut self.load, 2, load, factor)
    }

    fn set_rayleigh_damping_factors(&mut self, factors: RayleighFactors) {
        self.rayleigh = factors;
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}

impl_movable!(Spring1D, crate::broker::class_tags::SPRING_1D);

// ============================================================================
// TRUSS 2D
// ============================================================================

/// Linear two-node bar in the plane (2 DOFs per node, small displacements).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Truss2D {
    pub tag: i32,
    pub nodes: [i32; 2],
    /// Young's modulus
    pub e: f64,
    /// Cross-section area
    pub a: f64,
    pub rayleigh: RayleighFactors,
    #[serde(skip)]
    load: Vec<f64>,
}

impl Truss2D {
    pub fn new(tag: i32, node_i: i32, node_j: i32, e: f64, a: f64) -> Self {
        Self {
            tag,
            nodes: [node_i, node_j],
            e,
            a,
            ..Default::default()
        }
    }

    fn stiffness(&self, nodes: &NodeMap) -> DdResult<DMatrix<f64>> {
        let ni = nodes.get(&self.nodes[0]).ok_or(DdError::UnknownNode(self.nodes[0]))?;
        let nj = nodes.get(&self.nodes[1]).ok_or(DdError::UnknownNode(self.nodes[1]))?;
        if ni.coords.len() < 2 || nj.coords.len() < 2 {
            return Err(DdError::invalid_model(format!(
                "truss {} needs 2-D node coordinates",
                self.tag
            )));
        }

        let dx = nj.coords[0] - ni.coords[0];
        let dy = nj.coords[1] - ni.coords[1];
        let length = (dx * dx + dy * dy).sqrt();
        if length <= f64::EPSILON {
            return Err(DdError::invalid_model(format!("truss {} has zero length", self.tag)));
        }

        let (c, s) = (dx / length, dy / length);
        let k = self.e * self.a / length;
        let (cc, cs, ss) = (c * c * k, c * s * k, s * s * k);
        Ok(DMatrix::from_row_slice(
            4,
            4,
            &[
                cc, cs, -cc, -cs, //
                cs, ss, -cs, -ss, //
                -cc, -cs, cc, cs, //
                -cs, -ss, cs, ss,
            ],
        ))
    }
}

impl Element for Truss2D {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn connected_nodes(&self) -> &[i32] {
        &self.nodes
    }

    fn dofs_per_node(&self) -> usize {
        2
    }

    fn tangent_stiff(&self, nodes: &NodeMap) -> DdResult<DMatrix<f64>> {
        // Validates node dofs as a side effect, like resisting_force does.
        element_disp(nodes, &self.nodes, 2)?;
        self.stiffness(nodes)
    }

    fn resisting_force(&self, nodes: &NodeMap) -> DdResult<DVector<f64>> {
        let u = element_disp(nodes, &self.nodes, 2)?;
        let k = self.stiffness(nodes)?;
        Ok(subtract_load(k * u, &self.load))
    }

    fn zero_load(&mut self) {
        self.load.clear();
    }

    fn add_load(&mut self, load: &[f64], factor: f64) -> DdResult<()> {
        accumulate_load(&mut self.load, 4, load, factor)
    }

    fn set_rayleigh_damping_factors(&mut self, factors: RayleighFactors) {
        self.rayleigh = factors;
    }

    fn clone_box(&self) -> Box<dyn Element> {
        Box::new(self.clone())
    }
}

impl_movable!(Truss2D, crate::broker::class_tags::TRUSS_2D);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn nodes_1d(u: f64) -> NodeMap {
        let mut nodes = NodeMap::new();
        nodes.insert(1, Node::new(1, 1, vec![0.0]));
        let mut n2 = Node::new(2, 1, vec![1.0]);
        n2.set_trial_disp(0, u).unwrap();
        nodes.insert(2, n2);
        nodes
    }

    #[test]
    fn test_spring_hardening_tangent() {
        let spring = Spring1D::new(1, 1, 2, 10.0).with_hardening(2.0);
        let nodes = nodes_1d(0.5);

        let k = spring.tangent_stiff(&nodes).unwrap();
        assert_relative_eq!(k[(0, 0)], 10.0 + 3.0 * 2.0 * 0.25);

        let f = spring.resisting_force(&nodes).unwrap();
        assert_relative_eq!(f[1], 10.0 * 0.5 + 2.0 * 0.125);
        assert_relative_eq!(f[0], -f[1]);
    }

    #[test]
    fn test_spring_element_load() {
        let mut spring = Spring1D::new(1, 1, 2, 10.0);
        spring.add_load(&[0.0, 4.0], 0.5).unwrap();
        let f = spring.resisting_force(&nodes_1d(0.0)).unwrap();
        assert_relative_eq!(f[1], -2.0);

        spring.zero_load();
        let f = spring.resisting_force(&nodes_1d(0.0)).unwrap();
        assert_relative_eq!(f[1], 0.0);
    }

    #[test]
    fn test_truss_inclined_stiffness() {
        let mut nodes = NodeMap::new();
        nodes.insert(1, Node::new(1, 2, vec![0.0, 0.0]));
        nodes.insert(2, Node::new(2, 2, vec![3.0, 4.0]));

        let truss = Truss2D::new(7, 1, 2, 100.0, 0.5);
        let k = truss.tangent_stiff(&nodes).unwrap();

        // EA/L = 10, c = 0.6, s = 0.8
        assert_relative_eq!(k[(0, 0)], 3.6, epsilon = 1e-12);
        assert_relative_eq!(k[(0, 1)], 4.8, epsilon = 1e-12);
        assert_relative_eq!(k[(1, 1)], 6.4, epsilon = 1e-12);
        assert_relative_eq!(k[(0, 2)], -3.6, epsilon = 1e-12);
        assert_relative_eq!(k.clone() - k.transpose(), DMatrix::zeros(4, 4));
    }

    #[test]
    fn test_wrong_node_dofs_rejected() {
        let spring = Spring1D::new(1, 1, 2, 1.0);
        let mut nodes = NodeMap::new();
        nodes.insert(1, Node::new(1, 2, vec![0.0, 0.0]));
        nodes.insert(2, Node::new(2, 2, vec![1.0, 0.0]));
        assert!(spring.tangent_stiff(&nodes).is_err());
    }
}
