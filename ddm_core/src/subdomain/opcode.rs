//! Remote operation codes. Values are part of the wire contract.

use crate::error::DdError;

/// Operation requested of a remote subdomain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum Opcode {
    Die = 0,
    AddElement = 1,
    AddNode = 2,
    AddExternalNode = 3,
    AddSpConstraint = 4,
    AddMpConstraint = 5,
    AddLoadPattern = 6,
    AddNodalLoadToPattern = 7,
    AddElementalLoadToPattern = 8,
    AddSpConstraintToPattern = 9,
    RemoveElement = 10,
    RemoveNode = 11,
    RemoveSpConstraint = 12,
    RemoveMpConstraint = 13,
    RemoveLoadPattern = 14,
    RemoveNodalLoadFromPattern = 15,
    RemoveElementalLoadFromPattern = 16,
    RemoveSpConstraintFromPattern = 17,
    GetElement = 20,
    GetNode = 21,
    HasElement = 22,
    HasNode = 23,
    SetCommitTag = 25,
    SetCurrentTime = 26,
    SetCommittedTime = 27,
    SetLoadConstant = 31,
    ApplyLoad = 32,
    Update = 33,
    Commit = 34,
    RevertToLastCommit = 35,
    RevertToStart = 36,
    ComputeNodalResponse = 37,
    UpdateTimeDt = 38,
    SetDomainDecompAnalysis = 40,
    DomainChange = 41,
    ClearAnalysis = 42,
    SetAnalysisAlgorithm = 43,
    SetAnalysisIntegrator = 44,
    SetAnalysisLinearSoe = 45,
    SetAnalysisConvergenceTest = 46,
    GetTang = 53,
    GetResistingForce = 54,
    ComputeTang = 55,
    ComputeResidual = 56,
    GetCost = 60,
    BuildSubdomain = 70,
    GetRemoteData = 71,
    SetTag = 72,
    NewStep = 73,
    GetElementPtr = 90,
    GetNodePtr = 91,
    GetNodeDisp = 92,
    SetMass = 93,
    SetRayleighDampingFactors = 94,
    WipeAnalysis = 95,
    ClearAll = 96,
    Print = 150,
    AddRecorder = 151,
    RemoveRecorders = 152,
}

impl Opcode {
    /// Every opcode, in value order.
    pub const ALL: [Opcode; 59] = [
        Opcode::Die,
        Opcode::AddElement,
        Opcode::AddNode,
        Opcode::AddExternalNode,
        Opcode::AddSpConstraint,
        Opcode::AddMpConstraint,
        Opcode::AddLoadPattern,
        Opcode::AddNodalLoadToPattern,
        Opcode::AddElementalLoadToPattern,
        Opcode::AddSpConstraintToPattern,
        Opcode::RemoveElement,
        Opcode::RemoveNode,
        Opcode::RemoveSpConstraint,
        Opcode::RemoveMpConstraint,
        Opcode::RemoveLoadPattern,
        Opcode::RemoveNodalLoadFromPattern,
        Opcode::RemoveElementalLoadFromPattern,
        Opcode::RemoveSpConstraintFromPattern,
        Opcode::GetElement,
        Opcode::GetNode,
        Opcode::HasElement,
        Opcode::HasNode,
        Opcode::SetCommitTag,
        Opcode::SetCurrentTime,
        Opcode::SetCommittedTime,
        Opcode::SetLoadConstant,
        Opcode::ApplyLoad,
        Opcode::Update,
        Opcode::Commit,
        Opcode::RevertToLastCommit,
        Opcode::RevertToStart,
        Opcode::ComputeNodalResponse,
        Opcode::UpdateTimeDt,
        Opcode::SetDomainDecompAnalysis,
        Opcode::DomainChange,
        Opcode::ClearAnalysis,
        Opcode::SetAnalysisAlgorithm,
        Opcode::SetAnalysisIntegrator,
        Opcode::SetAnalysisLinearSoe,
        Opcode::SetAnalysisConvergenceTest,
        Opcode::GetTang,
        Opcode::GetResistingForce,
        Opcode::ComputeTang,
        Opcode::ComputeResidual,
        Opcode::GetCost,
        Opcode::BuildSubdomain,
        Opcode::GetRemoteData,
        Opcode::SetTag,
        Opcode::NewStep,
        Opcode::GetElementPtr,
        Opcode::GetNodePtr,
        Opcode::GetNodeDisp,
        Opcode::SetMass,
        Opcode::SetRayleighDampingFactors,
        Opcode::WipeAnalysis,
        Opcode::ClearAll,
        Opcode::Print,
        Opcode::AddRecorder,
        Opcode::RemoveRecorders,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Opcode {
    type Error = DdError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.code() == code)
            .ok_or(DdError::UnknownOpcode(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_unique_and_sorted() {
        let codes: Vec<i32> = Opcode::ALL.iter().map(|op| op.code()).collect();
        let unique: HashSet<i32> = codes.iter().copied().collect();
        assert_eq!(unique.len(), codes.len());
        assert!(codes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_round_trip_and_gaps() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::try_from(op.code()).unwrap(), op);
        }
        for code in [-1, 18, 19, 24, 28, 30, 39, 47, 52, 57, 61, 74, 97, 149, 153] {
            assert!(matches!(
                Opcode::try_from(code),
                Err(DdError::UnknownOpcode(c)) if c == code
            ));
        }
    }
}
