//! Request and reply shapes of every opcode.
//!
//! A request is an `Id` header `[opcode, int args...]` followed by the
//! opcode's payload frames. A reply is an `Id` status frame `[status]`,
//! followed by payload frames only when the status is non-negative.
//!
//! | opcode | int args | payload | reply |
//! |---|---|---|---|
//! | `Add*` (1-6) | | object | status |
//! | `Add*ToPattern` (7-9) | pattern | object | status |
//! | `Remove*` (10-14) | tag | | 1 + object, or 0 |
//! | `Remove*FromPattern` (15-17) | tag, pattern | | 1 + object, or 0 |
//! | `GetElement`, `GetNode` (20, 21, 90, 91) | tag | | 1 + object, or 0 |
//! | `HasElement`, `HasNode` | tag | | 1 or 0 |
//! | `SetCommitTag`, `SetTag` | tag | | status |
//! | `SetCurrentTime`, `SetCommittedTime`, `ApplyLoad`, `NewStep` | | scalar | status |
//! | `UpdateTimeDt` | | vector `[time, dt]` | status |
//! | `ComputeNodalResponse` | | vector | status |
//! | `SetDomainDecompAnalysis`, `SetAnalysisIntegrator`, `SetAnalysisConvergenceTest`, `BuildSubdomain`, `AddRecorder` | | object | status |
//! | `SetAnalysisAlgorithm` | algorithm code | | status |
//! | `SetAnalysisLinearSoe` | solver class tag | | status |
//! | `GetTang` | | | 0 + matrix |
//! | `GetResistingForce` | | | 0 + vector |
//! | `GetCost` | | | 0 + scalar |
//! | `GetRemoteData` | | | 0 + id `[num_ext, node, dof, ...]` |
//! | `GetNodeDisp` | node, dof | | 0 + scalar |
//! | `SetMass` | node | matrix | status |
//! | `SetRayleighDampingFactors` | | vector (4) | status |
//! | `Print` | | | 0 + report object |
//! | everything else | | | status |

use ddm_env::{Channel, ChannelError, ClassTag, Movable, Payload};
use nalgebra::{DMatrix, DVector};

use crate::analysis::{AlgorithmKind, AnalysisConfig, ConvergenceTest, LoadControl};
use crate::broker::ObjectBroker;
use crate::error::{DdError, DdResult};
use crate::model::{
    DisplacementRecorder, Element, ElementalLoad, EqualDof, LoadPattern, NodalLoad, Node,
    RayleighFactors, SpConstraint,
};
use crate::subdomain::opcode::Opcode;
use crate::subdomain::{Report, Subdomain, SubdomainBlueprint};

/// `db_tag` of request frames.
pub const REQUEST_DB_TAG: i32 = 0;
/// `db_tag` of reply frames.
pub const REPLY_DB_TAG: i32 = 1;

/// A decoded request.
#[derive(Debug)]
pub enum Request {
    Die,
    AddElement(Box<dyn Element>),
    AddNode(Node),
    AddExternalNode(Node),
    AddSpConstraint(SpConstraint),
    AddMpConstraint(EqualDof),
    AddLoadPattern(LoadPattern),
    AddNodalLoadToPattern { pattern: i32, load: NodalLoad },
    AddElementalLoadToPattern { pattern: i32, load: ElementalLoad },
    AddSpConstraintToPattern { pattern: i32, sp: SpConstraint },
    RemoveElement(i32),
    RemoveNode(i32),
    RemoveSpConstraint(i32),
    RemoveMpConstraint(i32),
    RemoveLoadPattern(i32),
    RemoveNodalLoadFromPattern { tag: i32, pattern: i32 },
    RemoveElementalLoadFromPattern { tag: i32, pattern: i32 },
    RemoveSpConstraintFromPattern { tag: i32, pattern: i32 },
    GetElement(i32),
    GetNode(i32),
    HasElement(i32),
    HasNode(i32),
    SetCommitTag(i32),
    SetCurrentTime(f64),
    SetCommittedTime(f64),
    SetLoadConstant,
    ApplyLoad(f64),
    Update,
    Commit,
    RevertToLastCommit,
    RevertToStart,
    ComputeNodalResponse(DVector<f64>),
    UpdateTimeDt { time: f64, dt: f64 },
    SetDomainDecompAnalysis(AnalysisConfig),
    DomainChange,
    ClearAnalysis,
    SetAnalysisAlgorithm(AlgorithmKind),
    SetAnalysisIntegrator(LoadControl),
    SetAnalysisLinearSoe(ClassTag),
    SetAnalysisConvergenceTest(ConvergenceTest),
    GetTang,
    GetResistingForce,
    ComputeTang,
    ComputeResidual,
    GetCost,
    BuildSubdomain(SubdomainBlueprint),
    GetRemoteData,
    SetTag(i32),
    NewStep(f64),
    GetNodeDisp { node: i32, dof: usize },
    SetMass { node: i32, mass: DMatrix<f64> },
    SetRayleighDampingFactors(RayleighFactors),
    WipeAnalysis,
    ClearAll,
    Print,
    AddRecorder(DisplacementRecorder),
    RemoveRecorders,
}

fn object<M: Movable + ?Sized>(object: &M) -> Result<Payload, ChannelError> {
    Ok(Payload::Object {
        class_tag: object.class_tag(),
        bytes: object.send_self()?,
    })
}

fn recv_movable<T: Movable + Default, C: Channel + ?Sized>(channel: &mut C) -> DdResult<T> {
    let mut value = T::default();
    channel.recv_obj(REQUEST_DB_TAG, &mut value)?;
    Ok(value)
}

fn int_args<const N: usize>(op: Opcode, args: &[i32]) -> DdResult<[i32; N]> {
    args.try_into().map_err(|_| {
        DdError::malformed(format!(
            "{:?} takes {} int arguments, got {}",
            op,
            N,
            args.len()
        ))
    })
}

fn non_negative(value: i32, what: &str) -> DdResult<usize> {
    usize::try_from(value).map_err(|_| DdError::malformed(format!("negative {what} {value}")))
}

impl Request {
    /// Canonical opcode. Legacy aliases decode to their modern request.
    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Die => Opcode::Die,
            Request::AddElement(_) => Opcode::AddElement,
            Request::AddNode(_) => Opcode::AddNode,
            Request::AddExternalNode(_) => Opcode::AddExternalNode,
            Request::AddSpConstraint(_) => Opcode::AddSpConstraint,
            Request::AddMpConstraint(_) => Opcode::AddMpConstraint,
            Request::AddLoadPattern(_) => Opcode::AddLoadPattern,
            Request::AddNodalLoadToPattern { .. } => Opcode::AddNodalLoadToPattern,
            Request::AddElementalLoadToPattern { .. } => Opcode::AddElementalLoadToPattern,
            Request::AddSpConstraintToPattern { .. } => Opcode::AddSpConstraintToPattern,
            Request::RemoveElement(_) => Opcode::RemoveElement,
            Request::RemoveNode(_) => Opcode::RemoveNode,
            Request::RemoveSpConstraint(_) => Opcode::RemoveSpConstraint,
            Request::RemoveMpConstraint(_) => Opcode::RemoveMpConstraint,
            Request::RemoveLoadPattern(_) => Opcode::RemoveLoadPattern,
            Request::RemoveNodalLoadFromPattern { .. } => Opcode::RemoveNodalLoadFromPattern,
            Request::RemoveElementalLoadFromPattern { .. } => {
                Opcode::RemoveElementalLoadFromPattern
            }
            Request::RemoveSpConstraintFromPattern { .. } => Opcode::RemoveSpConstraintFromPattern,
            Request::GetElement(_) => Opcode::GetElement,
            Request::GetNode(_) => Opcode::GetNode,
            Request::HasElement(_) => Opcode::HasElement,
            Request::HasNode(_) => Opcode::HasNode,
            Request::SetCommitTag(_) => Opcode::SetCommitTag,
            Request::SetCurrentTime(_) => Opcode::SetCurrentTime,
            Request::SetCommittedTime(_) => Opcode::SetCommittedTime,
            Request::SetLoadConstant => Opcode::SetLoadConstant,
            Request::ApplyLoad(_) => Opcode::ApplyLoad,
            Request::Update => Opcode::Update,
            Request::Commit => Opcode::Commit,
            Request::RevertToLastCommit => Opcode::RevertToLastCommit,
            Request::RevertToStart => Opcode::RevertToStart,
            Request::ComputeNodalResponse(_) => Opcode::ComputeNodalResponse,
            Request::UpdateTimeDt { .. } => Opcode::UpdateTimeDt,
            Request::SetDomainDecompAnalysis(_) => Opcode::SetDomainDecompAnalysis,
            Request::DomainChange => Opcode::DomainChange,
            Request::ClearAnalysis => Opcode::ClearAnalysis,
            Request::SetAnalysisAlgorithm(_) => Opcode::SetAnalysisAlgorithm,
            Request::SetAnalysisIntegrator(_) => Opcode::SetAnalysisIntegrator,
            Request::SetAnalysisLinearSoe(_) => Opcode::SetAnalysisLinearSoe,
            Request::SetAnalysisConvergenceTest(_) => Opcode::SetAnalysisConvergenceTest,
            Request::GetTang => Opcode::GetTang,
            Request::GetResistingForce => Opcode::GetResistingForce,
            Request::ComputeTang => Opcode::ComputeTang,
            Request::ComputeResidual => Opcode::ComputeResidual,
            Request::GetCost => Opcode::GetCost,
            Request::BuildSubdomain(_) => Opcode::BuildSubdomain,
            Request::GetRemoteData => Opcode::GetRemoteData,
            Request::SetTag(_) => Opcode::SetTag,
            Request::NewStep(_) => Opcode::NewStep,
            Request::GetNodeDisp { .. } => Opcode::GetNodeDisp,
            Request::SetMass { .. } => Opcode::SetMass,
            Request::SetRayleighDampingFactors(_) => Opcode::SetRayleighDampingFactors,
            Request::WipeAnalysis => Opcode::WipeAnalysis,
            Request::ClearAll => Opcode::ClearAll,
            Request::Print => Opcode::Print,
            Request::AddRecorder(_) => Opcode::AddRecorder,
            Request::RemoveRecorders => Opcode::RemoveRecorders,
        }
    }

    /// Encodes into the header and the payload frames.
    pub fn encode(&self) -> Result<(Vec<i32>, Vec<Payload>), ChannelError> {
        let op = self.opcode().code();
        let (ints, payloads): (Vec<i32>, Vec<Payload>) = match self {
            Request::AddElement(element) => (vec![], vec![object(element.as_ref())?]),
            Request::AddNode(node) | Request::AddExternalNode(node) => (vec![], vec![object(node)?]),
            Request::AddSpConstraint(sp) => (vec![], vec![object(sp)?]),
            Request::AddMpConstraint(mp) => (vec![], vec![object(mp)?]),
            Request::AddLoadPattern(pattern) => (vec![], vec![object(pattern)?]),
            Request::AddNodalLoadToPattern { pattern, load } => {
                (vec![*pattern], vec![object(load)?])
            }
            Request::AddElementalLoadToPattern { pattern, load } => {
                (vec![*pattern], vec![object(load)?])
            }
            Request::AddSpConstraintToPattern { pattern, sp } => {
                (vec![*pattern], vec![object(sp)?])
            }
            Request::RemoveElement(tag)
            | Request::RemoveNode(tag)
            | Request::RemoveSpConstraint(tag)
            | Request::RemoveMpConstraint(tag)
            | Request::RemoveLoadPattern(tag)
            | Request::GetElement(tag)
            | Request::GetNode(tag)
            | Request::HasElement(tag)
            | Request::HasNode(tag)
            | Request::SetCommitTag(tag)
            | Request::SetTag(tag)
            | Request::SetAnalysisLinearSoe(tag) => (vec![*tag], vec![]),
            Request::RemoveNodalLoadFromPattern { tag, pattern }
            | Request::RemoveElementalLoadFromPattern { tag, pattern }
            | Request::RemoveSpConstraintFromPattern { tag, pattern } => {
                (vec![*tag, *pattern], vec![])
            }
            Request::SetCurrentTime(value)
            | Request::SetCommittedTime(value)
            | Request::ApplyLoad(value)
            | Request::NewStep(value) => (vec![], vec![Payload::Scalar(*value)]),
            Request::ComputeNodalResponse(delta) => (vec![], vec![Payload::from_vector(delta)]),
            Request::UpdateTimeDt { time, dt } => (vec![], vec![Payload::Vector(vec![*time, *dt])]),
            Request::SetDomainDecompAnalysis(config) => (vec![], vec![object(config)?]),
            Request::SetAnalysisAlgorithm(kind) => (vec![kind.code()], vec![]),
            Request::SetAnalysisIntegrator(integrator) => (vec![], vec![object(integrator)?]),
            Request::SetAnalysisConvergenceTest(test) => (vec![], vec![object(test)?]),
            Request::BuildSubdomain(blueprint) => (vec![], vec![object(blueprint)?]),
            Request::GetNodeDisp { node, dof } => (vec![*node, *dof as i32], vec![]),
            Request::SetMass { node, mass } => (vec![*node], vec![Payload::from_matrix(mass)]),
            Request::SetRayleighDampingFactors(factors) => {
                (vec![], vec![Payload::Vector(factors.to_vec())])
            }
            Request::AddRecorder(recorder) => (vec![], vec![object(recorder)?]),
            Request::Die
            | Request::SetLoadConstant
            | Request::Update
            | Request::Commit
            | Request::RevertToLastCommit
            | Request::RevertToStart
            | Request::DomainChange
            | Request::ClearAnalysis
            | Request::GetTang
            | Request::GetResistingForce
            | Request::ComputeTang
            | Request::ComputeResidual
            | Request::GetCost
            | Request::GetRemoteData
            | Request::WipeAnalysis
            | Request::ClearAll
            | Request::Print
            | Request::RemoveRecorders => (vec![], vec![]),
        };

        let mut header = Vec::with_capacity(1 + ints.len());
        header.push(op);
        header.extend(ints);
        Ok((header, payloads))
    }

    /// Reads the payload frames announced by `header` and decodes the
    /// request. Any error here means the stream no longer matches the
    /// protocol.
    pub fn decode<C: Channel + ?Sized>(
        header: &[i32],
        channel: &mut C,
        broker: &ObjectBroker,
    ) -> DdResult<Self> {
        let (&code, args) = header
            .split_first()
            .ok_or_else(|| DdError::malformed("empty request header"))?;
        let op = Opcode::try_from(code)?;
        let db = REQUEST_DB_TAG;

        let request = match op {
            Opcode::Die => {
                int_args::<0>(op, args)?;
                Request::Die
            }
            Opcode::AddElement => {
                int_args::<0>(op, args)?;
                let (class_tag, bytes) = channel.recv_object_bytes(db)?;
                Request::AddElement(broker.element_from_bytes(class_tag, &bytes)?)
            }
            Opcode::AddNode => {
                int_args::<0>(op, args)?;
                Request::AddNode(recv_movable(channel)?)
            }
            Opcode::AddExternalNode => {
                int_args::<0>(op, args)?;
                Request::AddExternalNode(recv_movable(channel)?)
            }
            Opcode::AddSpConstraint => {
                int_args::<0>(op, args)?;
                Request::AddSpConstraint(recv_movable(channel)?)
            }
            Opcode::AddMpConstraint => {
                int_args::<0>(op, args)?;
                Request::AddMpConstraint(recv_movable(channel)?)
            }
            Opcode::AddLoadPattern => {
                int_args::<0>(op, args)?;
                Request::AddLoadPattern(recv_movable(channel)?)
            }
            Opcode::AddNodalLoadToPattern => {
                let [pattern] = int_args(op, args)?;
                Request::AddNodalLoadToPattern {
                    pattern,
                    load: recv_movable(channel)?,
                }
            }
            Opcode::AddElementalLoadToPattern => {
                let [pattern] = int_args(op, args)?;
                Request::AddElementalLoadToPattern {
                    pattern,
                    load: recv_movable(channel)?,
                }
            }
            Opcode::AddSpConstraintToPattern => {
                let [pattern] = int_args(op, args)?;
                Request::AddSpConstraintToPattern {
                    pattern,
                    sp: recv_movable(channel)?,
                }
            }
            Opcode::RemoveElement => Request::RemoveElement(int_args::<1>(op, args)?[0]),
            Opcode::RemoveNode => Request::RemoveNode(int_args::<1>(op, args)?[0]),
            Opcode::RemoveSpConstraint => Request::RemoveSpConstraint(int_args::<1>(op, args)?[0]),
            Opcode::RemoveMpConstraint => Request::RemoveMpConstraint(int_args::<1>(op, args)?[0]),
            Opcode::RemoveLoadPattern => Request::RemoveLoadPattern(int_args::<1>(op, args)?[0]),
            Opcode::RemoveNodalLoadFromPattern => {
                let [tag, pattern] = int_args(op, args)?;
                Request::RemoveNodalLoadFromPattern { tag, pattern }
            }
            Opcode::RemoveElementalLoadFromPattern => {
                let [tag, pattern] = int_args(op, args)?;
                Request::RemoveElementalLoadFromPattern { tag, pattern }
            }
            Opcode::RemoveSpConstraintFromPattern => {
                let [tag, pattern] = int_args(op, args)?;
                Request::RemoveSpConstraintFromPattern { tag, pattern }
            }
            Opcode::GetElement | Opcode::GetElementPtr => {
                Request::GetElement(int_args::<1>(op, args)?[0])
            }
            Opcode::GetNode | Opcode::GetNodePtr => Request::GetNode(int_args::<1>(op, args)?[0]),
            Opcode::HasElement => Request::HasElement(int_args::<1>(op, args)?[0]),
            Opcode::HasNode => Request::HasNode(int_args::<1>(op, args)?[0]),
            Opcode::SetCommitTag => Request::SetCommitTag(int_args::<1>(op, args)?[0]),
            Opcode::SetCurrentTime => {
                int_args::<0>(op, args)?;
                Request::SetCurrentTime(channel.recv_scalar(db)?)
            }
            Opcode::SetCommittedTime => {
                int_args::<0>(op, args)?;
                Request::SetCommittedTime(channel.recv_scalar(db)?)
            }
            Opcode::SetLoadConstant => {
                int_args::<0>(op, args)?;
                Request::SetLoadConstant
            }
            Opcode::ApplyLoad => {
                int_args::<0>(op, args)?;
                Request::ApplyLoad(channel.recv_scalar(db)?)
            }
            Opcode::Update => {
                int_args::<0>(op, args)?;
                Request::Update
            }
            Opcode::Commit => {
                int_args::<0>(op, args)?;
                Request::Commit
            }
            Opcode::RevertToLastCommit => {
                int_args::<0>(op, args)?;
                Request::RevertToLastCommit
            }
            Opcode::RevertToStart => {
                int_args::<0>(op, args)?;
                Request::RevertToStart
            }
            Opcode::ComputeNodalResponse => {
                int_args::<0>(op, args)?;
                Request::ComputeNodalResponse(channel.recv_vector(db)?)
            }
            Opcode::UpdateTimeDt => {
                int_args::<0>(op, args)?;
                let values = channel.recv_vector(db)?;
                if values.len() != 2 {
                    return Err(DdError::malformed(format!(
                        "UpdateTimeDt takes [time, dt], got {} values",
                        values.len()
                    )));
                }
                Request::UpdateTimeDt {
                    time: values[0],
                    dt: values[1],
                }
            }
            Opcode::SetDomainDecompAnalysis => {
                int_args::<0>(op, args)?;
                Request::SetDomainDecompAnalysis(recv_movable(channel)?)
            }
            Opcode::DomainChange => {
                int_args::<0>(op, args)?;
                Request::DomainChange
            }
            Opcode::ClearAnalysis => {
                int_args::<0>(op, args)?;
                Request::ClearAnalysis
            }
            Opcode::SetAnalysisAlgorithm => {
                let [code] = int_args(op, args)?;
                Request::SetAnalysisAlgorithm(AlgorithmKind::from_code(code)?)
            }
            Opcode::SetAnalysisIntegrator => {
                int_args::<0>(op, args)?;
                Request::SetAnalysisIntegrator(recv_movable(channel)?)
            }
            Opcode::SetAnalysisLinearSoe => {
                Request::SetAnalysisLinearSoe(int_args::<1>(op, args)?[0])
            }
            Opcode::SetAnalysisConvergenceTest => {
                int_args::<0>(op, args)?;
                Request::SetAnalysisConvergenceTest(recv_movable(channel)?)
            }
            Opcode::GetTang => {
                int_args::<0>(op, args)?;
                Request::GetTang
            }
            Opcode::GetResistingForce => {
                int_args::<0>(op, args)?;
                Request::GetResistingForce
            }
            Opcode::ComputeTang => {
                int_args::<0>(op, args)?;
                Request::ComputeTang
            }
            Opcode::ComputeResidual => {
                int_args::<0>(op, args)?;
                Request::ComputeResidual
            }
            Opcode::GetCost => {
                int_args::<0>(op, args)?;
                Request::GetCost
            }
            Opcode::BuildSubdomain => {
                int_args::<0>(op, args)?;
                Request::BuildSubdomain(recv_movable(channel)?)
            }
            Opcode::GetRemoteData => {
                int_args::<0>(op, args)?;
                Request::GetRemoteData
            }
            Opcode::SetTag => Request::SetTag(int_args::<1>(op, args)?[0]),
            Opcode::NewStep => {
                int_args::<0>(op, args)?;
                Request::NewStep(channel.recv_scalar(db)?)
            }
            Opcode::GetNodeDisp => {
                let [node, dof] = int_args(op, args)?;
                Request::GetNodeDisp {
                    node,
                    dof: non_negative(dof, "dof")?,
                }
            }
            Opcode::SetMass => {
                let [node] = int_args(op, args)?;
                Request::SetMass {
                    node,
                    mass: channel.recv_matrix(db)?,
                }
            }
            Opcode::SetRayleighDampingFactors => {
                int_args::<0>(op, args)?;
                let values = channel.recv_vector(db)?;
                Request::SetRayleighDampingFactors(RayleighFactors::from_slice(values.as_slice())?)
            }
            Opcode::WipeAnalysis => {
                int_args::<0>(op, args)?;
                Request::WipeAnalysis
            }
            Opcode::ClearAll => {
                int_args::<0>(op, args)?;
                Request::ClearAll
            }
            Opcode::Print => {
                int_args::<0>(op, args)?;
                Request::Print
            }
            Opcode::AddRecorder => {
                int_args::<0>(op, args)?;
                Request::AddRecorder(recv_movable(channel)?)
            }
            Opcode::RemoveRecorders => {
                int_args::<0>(op, args)?;
                Request::RemoveRecorders
            }
        };
        Ok(request)
    }

    /// Executes the request on a subdomain.
    pub fn apply(self, subdomain: &mut dyn Subdomain) -> DdResult<Reply> {
        fn found<M: Movable + ?Sized>(value: Option<&M>) -> DdResult<Reply> {
            Ok(Reply::Found(value.map(object).transpose()?))
        }

        match self {
            Request::Die => Err(DdError::invalid_state("Die is handled by the actor loop")),
            Request::AddElement(element) => subdomain.add_element(element).map(Reply::done),
            Request::AddNode(node) => subdomain.add_node(node).map(Reply::done),
            Request::AddExternalNode(node) => subdomain.add_external_node(node).map(Reply::done),
            Request::AddSpConstraint(sp) => subdomain.add_sp_constraint(sp).map(Reply::done),
            Request::AddMpConstraint(mp) => subdomain.add_mp_constraint(mp).map(Reply::done),
            Request::AddLoadPattern(pattern) => {
                subdomain.add_load_pattern(pattern).map(Reply::done)
            }
            Request::AddNodalLoadToPattern { pattern, load } => {
                subdomain.add_nodal_load(load, pattern).map(Reply::done)
            }
            Request::AddElementalLoadToPattern { pattern, load } => {
                subdomain.add_elemental_load(load, pattern).map(Reply::done)
            }
            Request::AddSpConstraintToPattern { pattern, sp } => subdomain
                .add_sp_constraint_to_pattern(sp, pattern)
                .map(Reply::done),
            Request::RemoveElement(tag) => found(subdomain.remove_element(tag)?.as_deref()),
            Request::RemoveNode(tag) => found(subdomain.remove_node(tag)?.as_ref()),
            Request::RemoveSpConstraint(tag) => found(subdomain.remove_sp_constraint(tag)?.as_ref()),
            Request::RemoveMpConstraint(tag) => found(subdomain.remove_mp_constraint(tag)?.as_ref()),
            Request::RemoveLoadPattern(tag) => found(subdomain.remove_load_pattern(tag)?.as_ref()),
            Request::RemoveNodalLoadFromPattern { tag, pattern } => {
                found(subdomain.remove_nodal_load(tag, pattern)?.as_ref())
            }
            Request::RemoveElementalLoadFromPattern { tag, pattern } => {
                found(subdomain.remove_elemental_load(tag, pattern)?.as_ref())
            }
            Request::RemoveSpConstraintFromPattern { tag, pattern } => {
                found(subdomain.remove_sp_constraint_from_pattern(tag, pattern)?.as_ref())
            }
            Request::GetElement(tag) => found(subdomain.get_element(tag)?.as_deref()),
            Request::GetNode(tag) => found(subdomain.get_node(tag)?.as_ref()),
            Request::HasElement(tag) => subdomain.has_element(tag).map(Reply::Flag),
            Request::HasNode(tag) => subdomain.has_node(tag).map(Reply::Flag),
            Request::SetCommitTag(tag) => subdomain.set_commit_tag(tag).map(Reply::done),
            Request::SetCurrentTime(time) => subdomain.set_current_time(time).map(Reply::done),
            Request::SetCommittedTime(time) => {
                subdomain.set_committed_time(time).map(Reply::done)
            }
            Request::SetLoadConstant => subdomain.set_load_constant().map(Reply::done),
            Request::ApplyLoad(time) => subdomain.apply_load(time).map(Reply::done),
            Request::Update => subdomain.update().map(Reply::done),
            Request::Commit => subdomain.commit().map(Reply::done),
            Request::RevertToLastCommit => subdomain.revert_to_last_commit().map(Reply::done),
            Request::RevertToStart => subdomain.revert_to_start().map(Reply::done),
            Request::ComputeNodalResponse(delta) => {
                subdomain.compute_nodal_response(&delta).map(Reply::done)
            }
            Request::UpdateTimeDt { time, dt } => subdomain.update_time_dt(time, dt).map(Reply::done),
            Request::SetDomainDecompAnalysis(config) => {
                subdomain.set_domain_decomp_analysis(config).map(Reply::done)
            }
            Request::DomainChange => subdomain.domain_change().map(Reply::done),
            Request::ClearAnalysis => subdomain.clear_analysis().map(Reply::done),
            Request::SetAnalysisAlgorithm(kind) => {
                subdomain.set_analysis_algorithm(kind).map(Reply::done)
            }
            Request::SetAnalysisIntegrator(integrator) => {
                subdomain.set_analysis_integrator(integrator).map(Reply::done)
            }
            Request::SetAnalysisLinearSoe(class_tag) => {
                subdomain.set_analysis_linear_soe(class_tag).map(Reply::done)
            }
            Request::SetAnalysisConvergenceTest(test) => {
                subdomain.set_analysis_convergence_test(test).map(Reply::done)
            }
            Request::GetTang => subdomain.get_tang().map(Reply::Matrix),
            Request::GetResistingForce => subdomain.get_resisting_force().map(Reply::Vector),
            Request::ComputeTang => subdomain.compute_tang().map(Reply::done),
            Request::ComputeResidual => subdomain.compute_residual().map(Reply::done),
            Request::GetCost => subdomain.get_cost().map(Reply::Scalar),
            Request::BuildSubdomain(blueprint) => {
                subdomain.build_subdomain(blueprint).map(Reply::done)
            }
            Request::GetRemoteData => subdomain
                .get_remote_data()
                .map(|data| Reply::Id(data.to_id())),
            Request::SetTag(tag) => subdomain.set_tag(tag).map(Reply::done),
            Request::NewStep(dt) => subdomain.new_step(dt).map(Reply::done),
            Request::GetNodeDisp { node, dof } => {
                subdomain.get_node_disp(node, dof).map(Reply::Scalar)
            }
            Request::SetMass { node, mass } => subdomain.set_mass(node, mass).map(Reply::done),
            Request::SetRayleighDampingFactors(factors) => subdomain
                .set_rayleigh_damping_factors(factors)
                .map(Reply::done),
            Request::WipeAnalysis => subdomain.wipe_analysis().map(Reply::done),
            Request::ClearAll => subdomain.clear_all().map(Reply::done),
            Request::Print => {
                let report = Report(subdomain.print()?);
                Ok(Reply::Object(object(&report)?))
            }
            Request::AddRecorder(recorder) => subdomain.add_recorder(recorder).map(Reply::done),
            Request::RemoveRecorders => subdomain.remove_recorders().map(Reply::done),
        }
    }
}

/// A reply, before the status frame is written.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    Flag(bool),
    /// Status 1 with the object, or status 0
    Found(Option<Payload>),
    Scalar(f64),
    Vector(DVector<f64>),
    Matrix(DMatrix<f64>),
    Id(Vec<i32>),
    Object(Payload),
}

impl Reply {
    fn done(_: ()) -> Self {
        Reply::Done
    }

    /// Writes the status frame and any payload frame.
    pub fn send<C: Channel + ?Sized>(self, channel: &mut C, commit_tag: i32) -> Result<(), ChannelError> {
        let db = REPLY_DB_TAG;
        let (status, payload) = match self {
            Reply::Done => (0, None),
            Reply::Flag(flag) => (i32::from(flag), None),
            Reply::Found(None) => (0, None),
            Reply::Found(Some(payload)) => (1, Some(payload)),
            Reply::Scalar(value) => (0, Some(Payload::Scalar(value))),
            Reply::Vector(vector) => (0, Some(Payload::from_vector(&vector))),
            Reply::Matrix(matrix) => (0, Some(Payload::from_matrix(&matrix))),
            Reply::Id(id) => (0, Some(Payload::Id(id))),
            Reply::Object(payload) => (0, Some(payload)),
        };
        channel.send_id(db, commit_tag, &[status])?;
        if let Some(payload) = payload {
            channel.send_frame(ddm_env::Frame::new(db, commit_tag, payload))?;
        }
        Ok(())
    }

    /// Writes a failure status; no payload follows.
    pub fn send_failure<C: Channel + ?Sized>(
        channel: &mut C,
        commit_tag: i32,
        error: &DdError,
    ) -> Result<(), ChannelError> {
        channel.send_id(REPLY_DB_TAG, commit_tag, &[error.status_code()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Spring1D;
    use ddm_env::memory_pair;

    fn through_channel(request: Request) -> Request {
        let (mut tx, mut rx) = memory_pair(0, 1);
        let (header, payloads) = request.encode().unwrap();
        tx.send_id(REQUEST_DB_TAG, 0, &header).unwrap();
        for payload in payloads {
            tx.send_frame(ddm_env::Frame::new(REQUEST_DB_TAG, 0, payload))
                .unwrap();
        }
        let header = rx.recv_id(REQUEST_DB_TAG).unwrap();
        Request::decode(&header, &mut rx, &ObjectBroker::default()).unwrap()
    }

    #[test]
    fn test_element_request_uses_broker() {
        let request = Request::AddElement(Box::new(Spring1D::new(3, 1, 2, 7.0)));
        match through_channel(request) {
            Request::AddElement(element) => {
                assert_eq!(element.tag(), 3);
                assert_eq!(element.connected_nodes(), &[1, 2]);
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_legacy_aliases_decode() {
        let (mut tx, mut rx) = memory_pair(0, 1);
        tx.send_id(REQUEST_DB_TAG, 0, &[Opcode::GetNodePtr.code(), 5])
            .unwrap();
        let header = rx.recv_id(REQUEST_DB_TAG).unwrap();
        let request = Request::decode(&header, &mut rx, &ObjectBroker::default()).unwrap();
        assert!(matches!(request, Request::GetNode(5)));
        assert_eq!(request.opcode(), Opcode::GetNode);
    }

    #[test]
    fn test_wrong_arity_is_malformed() {
        let (_tx, mut rx) = memory_pair(0, 1);
        let broker = ObjectBroker::default();
        assert!(matches!(
            Request::decode(&[Opcode::RemoveNode.code()], &mut rx, &broker),
            Err(DdError::Malformed(_))
        ));
        assert!(matches!(
            Request::decode(&[Opcode::Commit.code(), 1], &mut rx, &broker),
            Err(DdError::Malformed(_))
        ));
        assert!(matches!(
            Request::decode(&[999], &mut rx, &broker),
            Err(DdError::UnknownOpcode(999))
        ));
    }

    #[test]
    fn test_scalar_and_vector_requests() {
        assert!(matches!(
            through_channel(Request::NewStep(0.5)),
            Request::NewStep(dt) if dt == 0.5
        ));
        assert!(matches!(
            through_channel(Request::UpdateTimeDt { time: 2.0, dt: 0.25 }),
            Request::UpdateTimeDt { time, dt } if time == 2.0 && dt == 0.25
        ));
        assert!(matches!(
            through_channel(Request::GetNodeDisp { node: 4, dof: 1 }),
            Request::GetNodeDisp { node: 4, dof: 1 }
        ));
    }
}
