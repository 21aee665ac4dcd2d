//! Tag-to-constructor registry for polymorphic receives.
//!
//! An object crosses a channel as `(class_tag, bytes)`. The receiver asks the
//! broker for a blank instance of the tagged type and lets it decode itself.

use ddm_env::ClassTag;
use std::collections::HashMap;
use std::fmt;

use crate::analysis::solver::{CholeskyDomainSolver, DomainSolver, LuDomainSolver};
use crate::error::{DdError, DdResult};
use crate::model::element::{Element, Spring1D, Truss2D};

/// Class tags of every Movable type in the engine. Part of the wire contract.
pub mod class_tags {
    use ddm_env::ClassTag;

    pub const NODE: ClassTag = 1;

    pub const SPRING_1D: ClassTag = 10;
    pub const TRUSS_2D: ClassTag = 11;

    pub const SP_CONSTRAINT: ClassTag = 20;
    pub const EQUAL_DOF: ClassTag = 21;

    pub const NODAL_LOAD: ClassTag = 30;
    pub const ELEMENTAL_LOAD: ClassTag = 31;
    pub const LOAD_PATTERN: ClassTag = 32;

    pub const DISP_RECORDER: ClassTag = 40;

    pub const LU_DOMAIN_SOLVER: ClassTag = 50;
    pub const CHOLESKY_DOMAIN_SOLVER: ClassTag = 51;

    pub const LOAD_CONTROL: ClassTag = 60;
    pub const CONVERGENCE_TEST: ClassTag = 61;
    pub const ANALYSIS_CONFIG: ClassTag = 62;

    pub const SUBDOMAIN_BLUEPRINT: ClassTag = 70;
    pub const REPORT: ClassTag = 80;
}

pub type ElementCtor = fn() -> Box<dyn Element>;
pub type DomainSolverCtor = fn() -> Box<dyn DomainSolver>;

/// Allocates blank elements and domain solvers by class tag.
#[derive(Clone)]
pub struct ObjectBroker {
    elements: HashMap<ClassTag, ElementCtor>,
    solvers: HashMap<ClassTag, DomainSolverCtor>,
}

fn blank_spring_1d() -> Box<dyn Element> {
    Box::new(Spring1D::default())
}

fn blank_truss_2d() -> Box<dyn Element> {
    Box::new(Truss2D::default())
}

fn blank_lu_solver() -> Box<dyn DomainSolver> {
    Box::new(LuDomainSolver::default())
}

fn blank_cholesky_solver() -> Box<dyn DomainSolver> {
    Box::new(CholeskyDomainSolver::default())
}

impl Default for ObjectBroker {
    fn default() -> Self {
        let mut broker = Self::empty();
        broker.register_element(class_tags::SPRING_1D, blank_spring_1d);
        broker.register_element(class_tags::TRUSS_2D, blank_truss_2d);
        broker.register_domain_solver(class_tags::LU_DOMAIN_SOLVER, blank_lu_solver);
        broker.register_domain_solver(class_tags::CHOLESKY_DOMAIN_SOLVER, blank_cholesky_solver);
        broker
    }
}

impl fmt::Debug for ObjectBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut elements: Vec<_> = self.elements.keys().collect();
        let mut solvers: Vec<_> = self.solvers.keys().collect();
        elements.sort();
        solvers.sort();
        f.debug_struct("ObjectBroker")
            .field("elements", &elements)
            .field("solvers", &solvers)
            .finish()
    }
}

impl ObjectBroker {
    /// Broker with no constructors at all.
    pub fn empty() -> Self {
        Self {
            elements: HashMap::new(),
            solvers: HashMap::new(),
        }
    }

    /// Registers (or replaces) an element constructor.
    pub fn register_element(&mut self, class_tag: ClassTag, ctor: ElementCtor) {
        self.elements.insert(class_tag, ctor);
    }

    /// Registers (or replaces) a domain solver constructor.
    pub fn register_domain_solver(&mut self, class_tag: ClassTag, ctor: DomainSolverCtor) {
        self.solvers.insert(class_tag, ctor);
    }

    /// Blank element of the tagged type, `None` for unknown tags.
    pub fn new_element(&self, class_tag: ClassTag) -> Option<Box<dyn Element>> {
        self.elements.get(&class_tag).map(|ctor| ctor())
    }

    /// Blank domain solver of the tagged type, `None` for unknown tags.
    pub fn new_domain_solver(&self, class_tag: ClassTag) -> Option<Box<dyn DomainSolver>> {
        self.solvers.get(&class_tag).map(|ctor| ctor())
    }

    /// Allocates and decodes an element.
    pub fn element_from_bytes(&self, class_tag: ClassTag, bytes: &[u8]) -> DdResult<Box<dyn Element>> {
        let mut element = self
            .new_element(class_tag)
            .ok_or(DdError::UnknownClassTag(class_tag))?;
        element.recv_self(bytes)?;
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddm_env::Movable;

    #[test]
    fn test_unknown_tag_yields_none() {
        let broker = ObjectBroker::default();
        assert!(broker.new_element(9999).is_none());
        assert!(broker.new_domain_solver(class_tags::SPRING_1D).is_none());
        assert!(matches!(
            broker.element_from_bytes(9999, &[]),
            Err(DdError::UnknownClassTag(9999))
        ));
    }

    #[test]
    fn test_element_rebuilt_from_bytes() {
        let broker = ObjectBroker::default();
        let spring = Spring1D::new(4, 1, 2, 3.0).with_hardening(0.5);
        let bytes = spring.send_self().unwrap();

        let rebuilt = broker
            .element_from_bytes(class_tags::SPRING_1D, &bytes)
            .unwrap();
        assert_eq!(rebuilt.tag(), 4);
        assert_eq!(rebuilt.class_tag(), class_tags::SPRING_1D);
        assert_eq!(rebuilt.connected_nodes(), &[1, 2]);
    }

    #[test]
    fn test_runtime_registration() {
        let mut broker = ObjectBroker::empty();
        assert!(broker.new_element(class_tags::TRUSS_2D).is_none());
        broker.register_element(class_tags::TRUSS_2D, blank_truss_2d);
        assert!(broker.new_element(class_tags::TRUSS_2D).is_some());
    }
}
