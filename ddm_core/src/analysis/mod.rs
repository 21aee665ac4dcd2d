//! Analysis aggregate of a subdomain and its condensation machinery.

pub mod config;
pub mod dd_analysis;
pub mod handler;
pub mod integrator;
pub mod model;
pub mod numberer;
pub mod soe;
pub mod solver;

pub use config::{AlgorithmKind, AnalysisConfig, ConvergenceTest};
pub use dd_analysis::{AnalysisPhase, DomainDecompositionAnalysis};
pub use handler::ConstraintHandler;
pub use integrator::LoadControl;
pub use model::AnalysisModel;
pub use numberer::DofNumberer;
pub use soe::LinearSoe;
pub use solver::{
    CholeskyDomainSolver, CholeskyFactor, DenseDomainSolver, DomainSolver, InternalFactor,
    LuDomainSolver, LuFactor,
};
