//! Minimal finite-element model: nodes, elements, constraints, loads.

pub mod constraint;
pub mod domain;
pub mod element;
pub mod load;
pub mod node;
pub mod recorder;

pub use constraint::{EqualDof, SpConstraint};
pub use domain::Domain;
pub use element::{Element, NodeMap, RayleighFactors, Spring1D, Truss2D};
pub use load::{ElementalLoad, LoadPattern, NodalLoad, TimeSeries};
pub use node::Node;
pub use recorder::DisplacementRecorder;
