//! Scenario catalogue.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// DDM-001: linear springs in series, random stiffness
    LinearChain,

    /// DDM-002: cubic hardening springs, Newton on both levels
    HardeningChain,

    /// DDM-003: 2-D truss with two DOFs per node
    TrussBridge,

    /// DDM-004: a single subdomain, nothing to condense onto
    EmptyInterface,

    /// DDM-005: a link dies in the middle of a step
    SeveredWorker,

    /// DDM-006: the mesh is edited between steps
    DomainEdit,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::LinearChain,
            ScenarioId::HardeningChain,
            ScenarioId::TrussBridge,
            ScenarioId::EmptyInterface,
            ScenarioId::SeveredWorker,
            ScenarioId::DomainEdit,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::LinearChain => "linear_chain",
            ScenarioId::HardeningChain => "hardening_chain",
            ScenarioId::TrussBridge => "truss_bridge",
            ScenarioId::EmptyInterface => "empty_interface",
            ScenarioId::SeveredWorker => "severed_worker",
            ScenarioId::DomainEdit => "domain_edit",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::LinearChain => "Linear spring chain, decomposed solve matches the oracle",
            ScenarioId::HardeningChain => "Hardening springs, nonlinear interface Newton converges to the oracle",
            ScenarioId::TrussBridge => "Plane truss, 2 DOFs per interface node",
            ScenarioId::EmptyInterface => "One subdomain, zero interface equations",
            ScenarioId::SeveredWorker => "Link severed mid-step: step fails, shadow poisoned, other workers exit cleanly",
            ScenarioId::DomainEdit => "Element swapped between steps, analysis rebuilds and still matches",
        }
    }

    /// Returns true if the scenario injects a fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, ScenarioId::SeveredWorker)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear_chain" | "linearchain" | "ddm-001" => Ok(ScenarioId::LinearChain),
            "hardening_chain" | "hardeningchain" | "ddm-002" => Ok(ScenarioId::HardeningChain),
            "truss_bridge" | "trussbridge" | "ddm-003" => Ok(ScenarioId::TrussBridge),
            "empty_interface" | "emptyinterface" | "ddm-004" => Ok(ScenarioId::EmptyInterface),
            "severed_worker" | "severedworker" | "ddm-005" => Ok(ScenarioId::SeveredWorker),
            "domain_edit" | "domainedit" | "ddm-006" => Ok(ScenarioId::DomainEdit),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
        }
        assert_eq!("DDM-003".parse::<ScenarioId>().unwrap(), ScenarioId::TrussBridge);
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
