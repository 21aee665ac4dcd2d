//! Single-point and multi-point constraints.

use serde::{Deserialize, Serialize};

/// Prescribes the displacement of one DOF.
///
/// Constrained DOFs are eliminated from the equations; the prescribed value
/// is imposed on the node when loads are applied. Inside a load pattern the
/// value is scaled by the pattern factor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpConstraint {
    pub tag: i32,
    pub node: i32,
    pub dof: usize,
    pub value: f64,
}

impl SpConstraint {
    pub fn new(tag: i32, node: i32, dof: usize, value: f64) -> Self {
        Self { tag, node, dof, value }
    }

    /// Homogeneous (fixed) constraint.
    pub fn fixed(tag: i32, node: i32, dof: usize) -> Self {
        Self::new(tag, node, dof, 0.0)
    }
}

impl_movable!(SpConstraint, crate::broker::class_tags::SP_CONSTRAINT);

/// Ties DOFs of a constrained node to the same DOFs of a retained node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EqualDof {
    pub tag: i32,
    pub retained: i32,
    pub constrained: i32,
    pub dofs: Vec<usize>,
}

impl EqualDof {
    pub fn new(tag: i32, retained: i32, constrained: i32, dofs: Vec<usize>) -> Self {
        Self {
            tag,
            retained,
            constrained,
            dofs,
        }
    }
}

impl_movable!(EqualDof, crate::broker::class_tags::EQUAL_DOF);
