//! Analysis settings that can be installed remotely.

use ddm_env::ClassTag;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::analysis::integrator::LoadControl;
use crate::broker::class_tags;
use crate::error::{DdError, DdResult};

/// How a subdomain completes its internal solve after receiving interface
/// increments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmKind {
    /// One back-substitution with the current factorization
    #[default]
    Linear,
    /// Back-substitution followed by Newton iterations on the internal DOFs
    /// with the interface held fixed
    Newton,
}

impl AlgorithmKind {
    /// Wire code.
    pub fn code(self) -> i32 {
        match self {
            AlgorithmKind::Linear => 0,
            AlgorithmKind::Newton => 1,
        }
    }

    pub fn from_code(code: i32) -> DdResult<Self> {
        match code {
            0 => Ok(AlgorithmKind::Linear),
            1 => Ok(AlgorithmKind::Newton),
            other => Err(DdError::malformed(format!("unknown algorithm code {other}"))),
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Linear => write!(f, "linear"),
            AlgorithmKind::Newton => write!(f, "newton"),
        }
    }
}

/// Norm-of-unbalance test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceTest {
    pub tol: f64,
    pub max_iter: usize,
}

impl Default for ConvergenceTest {
    fn default() -> Self {
        Self {
            tol: 1e-10,
            max_iter: 25,
        }
    }
}

impl ConvergenceTest {
    pub fn new(tol: f64, max_iter: usize) -> Self {
        Self { tol, max_iter }
    }

    pub fn is_converged(&self, norm: f64) -> bool {
        norm <= self.tol
    }
}

impl_movable!(ConvergenceTest, class_tags::CONVERGENCE_TEST);

/// Complete settings of a `DomainDecompositionAnalysis`.
///
/// Loaded from JSON by the harness and sent whole with
/// `SetDomainDecompAnalysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub integrator: LoadControl,

    /// Broker class tag of the domain solver
    pub solver: ClassTag,

    pub algorithm: AlgorithmKind,

    pub test: ConvergenceTest,

    /// Penalty factor for multi-point constraints
    pub penalty_alpha: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            integrator: LoadControl::default(),
            solver: class_tags::LU_DOMAIN_SOLVER,
            algorithm: AlgorithmKind::Linear,
            test: ConvergenceTest::default(),
            penalty_alpha: 1e8,
        }
    }
}

impl AnalysisConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(text: &str) -> DdResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| DdError::malformed(format!("analysis config: {e}")))
    }
}

impl_movable!(AnalysisConfig, class_tags::ANALYSIS_CONFIG);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            AnalysisConfig::from_json(r#"{ "algorithm": "Newton", "test": { "tol": 1e-6, "max_iter": 5 } }"#)
                .unwrap();
        assert_eq!(config.algorithm, AlgorithmKind::Newton);
        assert_eq!(config.test.max_iter, 5);
        assert_eq!(config.solver, class_tags::LU_DOMAIN_SOLVER);
    }

    #[test]
    fn test_algorithm_codes() {
        for kind in [AlgorithmKind::Linear, AlgorithmKind::Newton] {
            assert_eq!(AlgorithmKind::from_code(kind.code()).unwrap(), kind);
        }
        assert!(AlgorithmKind::from_code(7).is_err());
    }
}
