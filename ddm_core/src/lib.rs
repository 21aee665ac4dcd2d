//! DDM Core - Domain-Decomposition Analysis Engine
//!
//! Splits a finite-element model into subdomains, each owned by a worker, and
//! solves it through the interface alone:
//! 1. **Condensation**: every subdomain eliminates its internal equations
//!    (Schur complement) and reports an interface-sized tangent and residual
//! 2. **Remote subdomains**: a `ShadowSubdomain` on the coordinator forwards
//!    each call as an opcode over a `Channel` to an `ActorSubdomain` that owns
//!    the real mesh
//! 3. **Coordination**: `DomainDecompositionDriver` assembles the interface
//!    system, runs Newton iterations and pushes interface increments back

/// Implements `ddm_env::Movable` for a serde type through bincode.
macro_rules! impl_movable {
    ($ty:ty, $class_tag:expr) => {
        impl ddm_env::Movable for $ty {
            fn class_tag(&self) -> ddm_env::ClassTag {
                $class_tag
            }

            fn send_self(&self) -> Result<Vec<u8>, ddm_env::ChannelError> {
                ddm_env::encode(self)
            }

            fn recv_self(&mut self, bytes: &[u8]) -> Result<(), ddm_env::ChannelError> {
                *self = ddm_env::decode(bytes)?;
                Ok(())
            }
        }
    };
}

pub mod analysis;
pub mod broker;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod partition;
pub mod subdomain;

// Re-export key types for convenience
pub use analysis::{
    AlgorithmKind, AnalysisConfig, AnalysisPhase, CholeskyDomainSolver, ConvergenceTest,
    DomainDecompositionAnalysis, DomainSolver, LoadControl, LuDomainSolver,
};
pub use broker::ObjectBroker;
pub use coordinator::{DomainDecompositionDriver, DriverConfig, StepReport};
pub use error::{DdError, DdResult};
pub use model::{Domain, Element, Node};
pub use partition::{ModelDescription, Partitioner};
pub use subdomain::{
    ActorExit, ActorSubdomain, LocalSubdomain, Opcode, RemoteData, ShadowSubdomain, Subdomain,
    SubdomainBlueprint,
};
