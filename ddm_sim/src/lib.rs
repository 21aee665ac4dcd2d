//! Scenario harness for the domain-decomposition engine.
//!
//! Every run is reproducible from one 64-bit seed: the seed drives model
//! generation, the partition is deterministic, and the engine itself holds
//! no hidden randomness.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          SimWorld                            │
//! │  ┌────────────────────────────────────┐                      │
//! │  │ DomainDecompositionDriver          │                      │
//! │  │   ShadowSubdomain x N              │                      │
//! │  └───────┬────────────────────┬───────┘                      │
//! │    FaultyChannel        FaultyChannel    (memory or TCP)     │
//! │  ┌───────▼────────┐   ┌───────▼────────┐                     │
//! │  │ ActorSubdomain │   │ ActorSubdomain │   ...  (threads)    │
//! │  │ LocalSubdomain │   │ LocalSubdomain │                     │
//! │  └────────────────┘   └────────────────┘                     │
//! │                                                              │
//! │  Oracle: the same model solved undivided, for comparison     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use ddm_sim::{ScenarioRunner, SimConfig};
//! use ddm_sim::scenarios::ScenarioId;
//!
//! let runner = ScenarioRunner::new(SimConfig { seed: 7, ..Default::default() });
//! let result = runner.run(ScenarioId::HardeningChain);
//! assert!(result.passed);
//! ```

mod error;
mod model_gen;
mod network;
mod oracle;
mod runner;
pub mod scenarios;
mod world;

pub use error::{SimError, SimResult};
pub use model_gen::ModelGenerator;
pub use network::{FaultController, FaultyChannel};
pub use oracle::Oracle;
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, DISP_TOLERANCE};
pub use world::{run_tcp_worker, SimConfig, SimWorld, Transport, WorkerHandle, WorkerOutcome};
