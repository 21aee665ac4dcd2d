//! Subdomains: the `Subdomain` interface and its local and remote variants.
//!
//! ```text
//!  Coordinator                              Worker
//!  -----------                              ------
//!  DomainDecompositionDriver
//!     |  Box<dyn Subdomain>
//!     +-- LocalSubdomain (in process)
//!     +-- ShadowSubdomain ==Channel==> ActorSubdomain --> LocalSubdomain
//! ```
//!
//! The driver cannot tell the two variants apart: a shadow presents the exact
//! signatures of the local subdomain and turns every call into one opcode
//! round trip.

mod actor;
mod local;
mod opcode;
mod protocol;
mod shadow;

pub use actor::{ActorExit, ActorSubdomain};
pub use local::LocalSubdomain;
pub use opcode::Opcode;
pub use protocol::{Reply, Request, REPLY_DB_TAG, REQUEST_DB_TAG};
pub use shadow::{CallState, ShadowSubdomain};

use ddm_env::{ClassTag, Movable};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::analysis::{AlgorithmKind, AnalysisConfig, ConvergenceTest, LoadControl};
use crate::broker::{class_tags, ObjectBroker};
use crate::error::{DdError, DdResult};
use crate::model::{
    DisplacementRecorder, Domain, Element, ElementalLoad, EqualDof, LoadPattern, NodalLoad, Node,
    RayleighFactors, SpConstraint,
};

/// Operations every subdomain supports, local or remote.
///
/// Queries take `&mut self` because a remote subdomain needs its channel for
/// them. Removal and lookup return `None` for absent tags.
pub trait Subdomain: Send {
    fn tag(&self) -> i32;

    // Mesh edits
    fn add_element(&mut self, element: Box<dyn Element>) -> DdResult<()>;
    fn add_node(&mut self, node: Node) -> DdResult<()>;
    fn add_external_node(&mut self, node: Node) -> DdResult<()>;
    fn add_sp_constraint(&mut self, sp: SpConstraint) -> DdResult<()>;
    fn add_mp_constraint(&mut self, mp: EqualDof) -> DdResult<()>;
    fn add_load_pattern(&mut self, pattern: LoadPattern) -> DdResult<()>;
    fn add_nodal_load(&mut self, load: NodalLoad, pattern: i32) -> DdResult<()>;
    fn add_elemental_load(&mut self, load: ElementalLoad, pattern: i32) -> DdResult<()>;
    fn add_sp_constraint_to_pattern(&mut self, sp: SpConstraint, pattern: i32) -> DdResult<()>;
    fn remove_element(&mut self, tag: i32) -> DdResult<Option<Box<dyn Element>>>;
    fn remove_node(&mut self, tag: i32) -> DdResult<Option<Node>>;
    fn remove_sp_constraint(&mut self, tag: i32) -> DdResult<Option<SpConstraint>>;
    fn remove_mp_constraint(&mut self, tag: i32) -> DdResult<Option<EqualDof>>;
    fn remove_load_pattern(&mut self, tag: i32) -> DdResult<Option<LoadPattern>>;
    fn remove_nodal_load(&mut self, tag: i32, pattern: i32) -> DdResult<Option<NodalLoad>>;
    fn remove_elemental_load(&mut self, tag: i32, pattern: i32)
        -> DdResult<Option<ElementalLoad>>;
    fn remove_sp_constraint_from_pattern(
        &mut self,
        tag: i32,
        pattern: i32,
    ) -> DdResult<Option<SpConstraint>>;
    fn build_subdomain(&mut self, blueprint: SubdomainBlueprint) -> DdResult<()>;
    fn clear_all(&mut self) -> DdResult<()>;

    // Queries
    fn get_element(&mut self, tag: i32) -> DdResult<Option<Box<dyn Element>>>;
    fn get_node(&mut self, tag: i32) -> DdResult<Option<Node>>;
    fn has_element(&mut self, tag: i32) -> DdResult<bool>;
    fn has_node(&mut self, tag: i32) -> DdResult<bool>;
    fn get_node_disp(&mut self, node: i32, dof: usize) -> DdResult<f64>;
    fn print(&mut self) -> DdResult<String>;

    // Time and state
    fn set_tag(&mut self, tag: i32) -> DdResult<()>;
    fn set_commit_tag(&mut self, tag: i32) -> DdResult<()>;
    fn set_current_time(&mut self, time: f64) -> DdResult<()>;
    fn set_committed_time(&mut self, time: f64) -> DdResult<()>;
    fn update_time_dt(&mut self, time: f64, dt: f64) -> DdResult<()>;
    fn set_load_constant(&mut self) -> DdResult<()>;
    fn apply_load(&mut self, time: f64) -> DdResult<()>;
    fn update(&mut self) -> DdResult<()>;
    fn commit(&mut self) -> DdResult<()>;
    fn revert_to_last_commit(&mut self) -> DdResult<()>;
    fn revert_to_start(&mut self) -> DdResult<()>;
    fn set_mass(&mut self, node: i32, mass: DMatrix<f64>) -> DdResult<()>;
    fn set_rayleigh_damping_factors(&mut self, factors: RayleighFactors) -> DdResult<()>;
    fn add_recorder(&mut self, recorder: DisplacementRecorder) -> DdResult<()>;
    fn remove_recorders(&mut self) -> DdResult<()>;

    // Analysis
    fn set_domain_decomp_analysis(&mut self, config: AnalysisConfig) -> DdResult<()>;
    fn domain_change(&mut self) -> DdResult<()>;
    fn clear_analysis(&mut self) -> DdResult<()>;
    fn wipe_analysis(&mut self) -> DdResult<()>;
    fn set_analysis_algorithm(&mut self, algorithm: AlgorithmKind) -> DdResult<()>;
    fn set_analysis_integrator(&mut self, integrator: LoadControl) -> DdResult<()>;
    fn set_analysis_linear_soe(&mut self, solver: ClassTag) -> DdResult<()>;
    fn set_analysis_convergence_test(&mut self, test: ConvergenceTest) -> DdResult<()>;
    fn new_step(&mut self, dt: f64) -> DdResult<()>;
    fn compute_tang(&mut self) -> DdResult<()>;
    fn compute_residual(&mut self) -> DdResult<()>;
    /// Condensed tangent over the interface equations.
    fn get_tang(&mut self) -> DdResult<DMatrix<f64>>;
    /// Condensed residual over the interface equations.
    fn get_resisting_force(&mut self) -> DdResult<DVector<f64>>;
    /// Completes the internal solve for an interface increment.
    fn compute_nodal_response(&mut self, delta_ext: &DVector<f64>) -> DdResult<()>;
    /// Seconds spent forming the last tangent and residual.
    fn get_cost(&mut self) -> DdResult<f64>;
    fn get_remote_data(&mut self) -> DdResult<RemoteData>;
}

// ============================================================================
// REMOTE DATA
// ============================================================================

/// Interface layout of a subdomain: the `(node, dof)` of each condensed row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteData {
    pub interface: Vec<(i32, usize)>,
}

impl RemoteData {
    pub fn num_external_eqn(&self) -> usize {
        self.interface.len()
    }

    /// Wire form `[num_ext, node, dof, node, dof, ...]`.
    pub fn to_id(&self) -> Vec<i32> {
        let mut id = Vec::with_capacity(1 + 2 * self.interface.len());
        id.push(self.interface.len() as i32);
        for &(node, dof) in &self.interface {
            id.push(node);
            id.push(dof as i32);
        }
        id
    }

    pub fn from_id(id: &[i32]) -> DdResult<Self> {
        let (count, pairs) = id
            .split_first()
            .ok_or_else(|| DdError::malformed("empty remote data"))?;
        if *count < 0 || pairs.len() != 2 * (*count as usize) {
            return Err(DdError::malformed(format!(
                "remote data announces {} interface dofs in {} entries",
                count,
                pairs.len()
            )));
        }
        let mut interface = Vec::with_capacity(*count as usize);
        for pair in pairs.chunks_exact(2) {
            if pair[1] < 0 {
                return Err(DdError::malformed(format!("negative dof {}", pair[1])));
            }
            interface.push((pair[0], pair[1] as usize));
        }
        Ok(Self { interface })
    }
}

// ============================================================================
// BLUEPRINT
// ============================================================================

/// An object packed as class tag plus bytes, rebuilt through the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedObject {
    pub class_tag: ClassTag,
    pub bytes: Vec<u8>,
}

impl PackedObject {
    pub fn pack<M: Movable + ?Sized>(object: &M) -> DdResult<Self> {
        Ok(Self {
            class_tag: object.class_tag(),
            bytes: object.send_self()?,
        })
    }
}

/// Everything one subdomain owns after partitioning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubdomainBlueprint {
    pub tag: i32,
    pub nodes: Vec<Node>,
    /// Interface nodes, in the order their equations are numbered
    pub external_nodes: Vec<Node>,
    pub elements: Vec<PackedObject>,
    pub sp_constraints: Vec<SpConstraint>,
    pub mp_constraints: Vec<EqualDof>,
    pub load_patterns: Vec<LoadPattern>,
}

impl SubdomainBlueprint {
    pub fn new(tag: i32) -> Self {
        Self {
            tag,
            ..Default::default()
        }
    }

    pub fn push_element(&mut self, element: &dyn Element) -> DdResult<()> {
        self.elements.push(PackedObject::pack(element)?);
        Ok(())
    }

    pub fn has_node(&self, tag: i32) -> bool {
        self.nodes
            .iter()
            .chain(&self.external_nodes)
            .any(|n| n.tag == tag)
    }

    /// Populates `domain`, validating every component on the way in.
    pub fn build(&self, domain: &mut Domain, broker: &ObjectBroker) -> DdResult<()> {
        for node in &self.nodes {
            domain.add_node(node.clone())?;
        }
        for node in &self.external_nodes {
            domain.add_external_node(node.clone())?;
        }
        for packed in &self.elements {
            let element = broker.element_from_bytes(packed.class_tag, &packed.bytes)?;
            domain.add_element(element)?;
        }
        for sp in &self.sp_constraints {
            domain.add_sp_constraint(sp.clone())?;
        }
        for mp in &self.mp_constraints {
            domain.add_mp_constraint(mp.clone())?;
        }
        for pattern in &self.load_patterns {
            domain.add_load_pattern(pattern.empty_like())?;
            for load in pattern.nodal_loads.values() {
                domain.add_nodal_load(load.clone(), pattern.tag)?;
            }
            for load in pattern.elemental_loads.values() {
                domain.add_elemental_load(load.clone(), pattern.tag)?;
            }
            for sp in pattern.sp_constraints.values() {
                domain.add_sp_constraint_to_pattern(sp.clone(), pattern.tag)?;
            }
        }
        Ok(())
    }
}

impl_movable!(SubdomainBlueprint, class_tags::SUBDOMAIN_BLUEPRINT);

/// Text produced by `print`, moved as an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report(pub String);

impl_movable!(Report, class_tags::REPORT);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Spring1D;

    #[test]
    fn test_remote_data_wire_form() {
        let data = RemoteData {
            interface: vec![(4, 0), (9, 1)],
        };
        assert_eq!(data.to_id(), vec![2, 4, 0, 9, 1]);
        assert_eq!(RemoteData::from_id(&data.to_id()).unwrap(), data);
        assert_eq!(RemoteData::from_id(&[0]).unwrap().num_external_eqn(), 0);
        assert!(RemoteData::from_id(&[2, 4, 0]).is_err());
        assert!(RemoteData::from_id(&[]).is_err());
    }

    #[test]
    fn test_blueprint_builds_domain() {
        let mut blueprint = SubdomainBlueprint::new(1);
        blueprint.nodes.push(Node::new(1, 1, vec![0.0]));
        blueprint.external_nodes.push(Node::new(2, 1, vec![1.0]));
        blueprint
            .push_element(&Spring1D::new(1, 1, 2, 5.0))
            .unwrap();
        blueprint.sp_constraints.push(SpConstraint::fixed(1, 1, 0));

        let mut domain = Domain::new();
        blueprint.build(&mut domain, &ObjectBroker::default()).unwrap();

        assert!(domain.has_element(1));
        assert_eq!(domain.external_nodes(), &[2]);
        assert!(blueprint.has_node(2));
    }
}
