//! Error taxonomy of the analysis engine.
//!
//! No error ever crosses a channel as a value. On the wire a failure is a
//! negative status (see [`DdError::status_code`]) and the coordinator turns
//! it back into [`DdError::Remote`].

use ddm_env::{ChannelError, ClassTag};
use thiserror::Error;

use crate::subdomain::Opcode;

/// Engine errors.
#[derive(Debug, Error)]
pub enum DdError {
    /// Transport failure, fatal for the current step
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Worker received an opcode outside the fixed set
    #[error("Unknown opcode {0} (protocol/version skew)")]
    UnknownOpcode(i32),

    /// Request or reply did not have the shape its opcode prescribes
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The broker has no constructor for this tag
    #[error("Unknown class tag {0}")]
    UnknownClassTag(ClassTag),

    /// Singular or indefinite block during condensation or solve
    #[error("Numerical failure: {0}")]
    Numerical(String),

    #[error("Unknown node {0}")]
    UnknownNode(i32),

    #[error("Unknown element {0}")]
    UnknownElement(i32),

    #[error("Unknown load pattern {0}")]
    UnknownLoadPattern(i32),

    #[error("Duplicate {kind} tag {tag}")]
    DuplicateTag { kind: &'static str, tag: i32 },

    /// Model data inconsistent with the operation
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// Operation called in a state that does not allow it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Subdomain has no analysis installed
    #[error("Subdomain {0} has no domain-decomposition analysis")]
    NoAnalysis(i32),

    /// Remote operation reported failure
    #[error("Remote {opcode:?} failed with status {status}")]
    Remote { opcode: Opcode, status: i32 },

    /// An earlier transport failure desynchronized this shadow
    #[error("Shadow subdomain {0} is poisoned by an earlier transport failure")]
    Poisoned(i32),

    /// Newton iterations exhausted
    #[error("No convergence after {iterations} iterations (norm {norm:e})")]
    NotConverged { iterations: usize, norm: f64 },
}

pub type DdResult<T> = Result<T, DdError>;

impl DdError {
    /// Creates a malformed-message error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Creates a numerical-failure error.
    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    /// Creates an invalid-model error.
    pub fn invalid_model(msg: impl Into<String>) -> Self {
        Self::InvalidModel(msg.into())
    }

    /// Creates an invalid-state error.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Negative status code reported on the wire for this error.
    pub fn status_code(&self) -> i32 {
        match self {
            DdError::Channel(_) => -1,
            DdError::UnknownOpcode(_) => -2,
            DdError::Malformed(_) => -3,
            DdError::UnknownClassTag(_) => -4,
            DdError::Numerical(_) => -5,
            DdError::UnknownNode(_) => -6,
            DdError::UnknownElement(_) => -7,
            DdError::UnknownLoadPattern(_) => -8,
            DdError::DuplicateTag { .. } => -9,
            DdError::InvalidModel(_) => -10,
            DdError::InvalidState(_) => -11,
            DdError::NoAnalysis(_) => -12,
            // A worker never forwards these, but keep the mapping total.
            DdError::Remote { status, .. } => *status,
            DdError::Poisoned(_) => -13,
            DdError::NotConverged { .. } => -14,
        }
    }

    /// Returns true for failures that leave a channel unusable.
    pub fn is_transport(&self) -> bool {
        matches!(self, DdError::Channel(_) | DdError::Poisoned(_))
    }
}
