//! Coordinator-side proxy of a remote subdomain.

use ddm_env::{Channel, ChannelError, ClassTag, Frame, Movable};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::analysis::{AlgorithmKind, AnalysisConfig, ConvergenceTest, LoadControl};
use crate::broker::ObjectBroker;
use crate::error::{DdError, DdResult};
use crate::model::{
    DisplacementRecorder, Element, ElementalLoad, EqualDof, LoadPattern, NodalLoad, Node,
    RayleighFactors, SpConstraint,
};
use crate::subdomain::opcode::Opcode;
use crate::subdomain::protocol::{Request, REPLY_DB_TAG, REQUEST_DB_TAG};
use crate::subdomain::{RemoteData, Report, Subdomain, SubdomainBlueprint};

/// Progress of the current round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    Encoded,
    Sent,
    AwaitingReply,
    Decoded,
}

/// Forwards every `Subdomain` call to an actor over a channel.
///
/// Calls are strictly sequential. A transport failure in the middle of a call
/// leaves the stream out of step with the actor, so the shadow is poisoned
/// and refuses every later call.
///
/// Condensed tangents and residuals are checked against the interface size
/// reported by the last `get_remote_data`. A reply of the wrong shape is
/// `Malformed`; it was read in full, so the stream stays usable.
pub struct ShadowSubdomain<C: Channel> {
    tag: i32,
    channel: C,
    broker: ObjectBroker,
    state: CallState,
    poisoned: bool,
    terminated: bool,
    commit_tag: i32,

    /// Bumped by every state-changing call
    generation: u64,
    tang_computed: Option<u64>,
    residual_computed: Option<u64>,
    tangent_cache: Option<(u64, DMatrix<f64>)>,
    residual_cache: Option<(u64, DVector<f64>)>,
    /// Interface size from the last `get_remote_data`, until the mesh changes
    interface_size: Option<usize>,

    round_trips: usize,
}

impl<C: Channel> ShadowSubdomain<C> {
    pub fn new(tag: i32, channel: C) -> Self {
        Self::with_broker(tag, channel, ObjectBroker::default())
    }

    pub fn with_broker(tag: i32, channel: C, broker: ObjectBroker) -> Self {
        Self {
            tag,
            channel,
            broker,
            state: CallState::Idle,
            poisoned: false,
            terminated: false,
            commit_tag: 0,
            generation: 0,
            tang_computed: None,
            residual_computed: None,
            tangent_cache: None,
            residual_cache: None,
            interface_size: None,
            round_trips: 0,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Requests sent so far, `Die` included.
    pub fn round_trips(&self) -> usize {
        self.round_trips
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Sends `Die` and releases the channel.
    pub fn terminate(mut self) -> DdResult<()> {
        self.call(Request::Die)?;
        self.terminated = true;
        Ok(())
    }

    fn poison(&mut self, op: Opcode, err: ChannelError) -> DdError {
        warn!(subdomain = self.tag, ?op, state = ?self.state, "transport failure, shadow poisoned: {}", err);
        self.poisoned = true;
        DdError::Channel(err)
    }

    /// Sends one request and reads its status frame.
    ///
    /// A negative status becomes `DdError::Remote`; the stream stays usable
    /// because no payload follows a failure status.
    fn call(&mut self, request: Request) -> DdResult<i32> {
        if self.poisoned {
            return Err(DdError::Poisoned(self.tag));
        }
        if self.terminated {
            return Err(DdError::invalid_state(format!(
                "shadow subdomain {} already terminated",
                self.tag
            )));
        }

        let op = request.opcode();
        self.state = CallState::Idle;
        let (header, payloads) = request.encode()?;
        self.state = CallState::Encoded;

        debug!(subdomain = self.tag, ?op, "request");
        let sent = self
            .channel
            .send_id(REQUEST_DB_TAG, self.commit_tag, &header)
            .and_then(|_| {
                payloads.into_iter().try_for_each(|payload| {
                    self.channel
                        .send_frame(Frame::new(REQUEST_DB_TAG, self.commit_tag, payload))
                })
            });
        if let Err(err) = sent {
            return Err(self.poison(op, err));
        }
        self.state = CallState::Sent;
        self.round_trips += 1;

        if op == Opcode::Die {
            self.state = CallState::Decoded;
            return Ok(0);
        }

        self.state = CallState::AwaitingReply;
        let status = match self.channel.recv_id(REPLY_DB_TAG) {
            Ok(status) => status,
            Err(err) => return Err(self.poison(op, err)),
        };
        let status = match status.as_slice() {
            [status] => *status,
            other => {
                self.poisoned = true;
                return Err(DdError::malformed(format!(
                    "{:?} reply status has {} entries",
                    op,
                    other.len()
                )));
            }
        };

        if status < 0 {
            self.state = CallState::Decoded;
            warn!(subdomain = self.tag, ?op, status, "remote operation failed");
            return Err(DdError::Remote { opcode: op, status });
        }
        Ok(status)
    }

    /// Reads the payload frame of a successful reply.
    fn read<T>(
        &mut self,
        op: Opcode,
        recv: impl FnOnce(&mut C) -> Result<T, ChannelError>,
    ) -> DdResult<T> {
        match recv(&mut self.channel) {
            Ok(value) => {
                self.state = CallState::Decoded;
                Ok(value)
            }
            Err(err) => Err(self.poison(op, err)),
        }
    }

    fn call_unit(&mut self, request: Request) -> DdResult<()> {
        self.call(request)?;
        self.state = CallState::Decoded;
        Ok(())
    }

    /// State-changing call: everything cached is stale afterwards.
    fn call_mutating(&mut self, request: Request) -> DdResult<()> {
        self.generation += 1;
        self.call_unit(request)
    }

    /// Call that may change the interface layout.
    fn call_reshaping(&mut self, request: Request) -> DdResult<()> {
        self.reshaped();
        self.call_unit(request)
    }

    fn reshaped(&mut self) {
        self.generation += 1;
        self.interface_size = None;
    }

    /// Rejects condensed replies that do not fit the interface.
    fn check_interface(&self, op: Opcode, rows: usize, cols: usize) -> DdResult<()> {
        let square = cols == rows || op == Opcode::GetResistingForce;
        let sized = self.interface_size.map_or(true, |n| n == rows);
        if square && sized {
            return Ok(());
        }
        warn!(subdomain = self.tag, ?op, rows, cols, interface = ?self.interface_size, "reply does not fit the interface");
        Err(DdError::malformed(format!(
            "{:?} reply of shape {}x{} from subdomain {} with interface {:?}",
            op, rows, cols, self.tag, self.interface_size
        )))
    }

    fn call_flag(&mut self, request: Request) -> DdResult<bool> {
        let status = self.call(request)?;
        self.state = CallState::Decoded;
        Ok(status > 0)
    }

    /// Reads an optional object reply into a blank `T`.
    fn call_found<T: Movable + Default>(&mut self, request: Request) -> DdResult<Option<T>> {
        let op = request.opcode();
        if self.call(request)? == 0 {
            self.state = CallState::Decoded;
            return Ok(None);
        }
        let mut value = T::default();
        self.read(op, |channel| channel.recv_obj(REPLY_DB_TAG, &mut value))?;
        Ok(Some(value))
    }

    fn call_found_element(&mut self, request: Request) -> DdResult<Option<Box<dyn Element>>> {
        let op = request.opcode();
        if self.call(request)? == 0 {
            self.state = CallState::Decoded;
            return Ok(None);
        }
        let (class_tag, bytes) = self.read(op, |channel| channel.recv_object_bytes(REPLY_DB_TAG))?;
        Ok(Some(self.broker.element_from_bytes(class_tag, &bytes)?))
    }
}

impl<C: Channel> Drop for ShadowSubdomain<C> {
    fn drop(&mut self) {
        if self.poisoned || self.terminated {
            return;
        }
        if let Err(err) = self.channel.send_id(REQUEST_DB_TAG, self.commit_tag, &[Opcode::Die.code()]) {
            debug!(subdomain = self.tag, "die on drop not delivered: {}", err);
        }
    }
}

impl<C: Channel> Subdomain for ShadowSubdomain<C> {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn add_element(&mut self, element: Box<dyn Element>) -> DdResult<()> {
        self.call_reshaping(Request::AddElement(element))
    }

    fn add_node(&mut self, node: Node) -> DdResult<()> {
        self.call_reshaping(Request::AddNode(node))
    }

    fn add_external_node(&mut self, node: Node) -> DdResult<()> {
        self.call_reshaping(Request::AddExternalNode(node))
    }

    fn add_sp_constraint(&mut self, sp: SpConstraint) -> DdResult<()> {
        self.call_reshaping(Request::AddSpConstraint(sp))
    }

    fn add_mp_constraint(&mut self, mp: EqualDof) -> DdResult<()> {
        self.call_reshaping(Request::AddMpConstraint(mp))
    }

    fn add_load_pattern(&mut self, pattern: LoadPattern) -> DdResult<()> {
        self.call_reshaping(Request::AddLoadPattern(pattern))
    }

    fn add_nodal_load(&mut self, load: NodalLoad, pattern: i32) -> DdResult<()> {
        self.call_reshaping(Request::AddNodalLoadToPattern { pattern, load })
    }

    fn add_elemental_load(&mut self, load: ElementalLoad, pattern: i32) -> DdResult<()> {
        self.call_reshaping(Request::AddElementalLoadToPattern { pattern, load })
    }

    fn add_sp_constraint_to_pattern(&mut self, sp: SpConstraint, pattern: i32) -> DdResult<()> {
        self.call_reshaping(Request::AddSpConstraintToPattern { pattern, sp })
    }

    fn remove_element(&mut self, tag: i32) -> DdResult<Option<Box<dyn Element>>> {
        self.reshaped();
        self.call_found_element(Request::RemoveElement(tag))
    }

    fn remove_node(&mut self, tag: i32) -> DdResult<Option<Node>> {
        self.reshaped();
        self.call_found(Request::RemoveNode(tag))
    }

    fn remove_sp_constraint(&mut self, tag: i32) -> DdResult<Option<SpConstraint>> {
        self.reshaped();
        self.call_found(Request::RemoveSpConstraint(tag))
    }

    fn remove_mp_constraint(&mut self, tag: i32) -> DdResult<Option<EqualDof>> {
        self.reshaped();
        self.call_found(Request::RemoveMpConstraint(tag))
    }

    fn remove_load_pattern(&mut self, tag: i32) -> DdResult<Option<LoadPattern>> {
        self.reshaped();
        self.call_found(Request::RemoveLoadPattern(tag))
    }

    fn remove_nodal_load(&mut self, tag: i32, pattern: i32) -> DdResult<Option<NodalLoad>> {
        self.reshaped();
        self.call_found(Request::RemoveNodalLoadFromPattern { tag, pattern })
    }

    fn remove_elemental_load(
        &mut self,
        tag: i32,
        pattern: i32,
    ) -> DdResult<Option<ElementalLoad>> {
        self.reshaped();
        self.call_found(Request::RemoveElementalLoadFromPattern { tag, pattern })
    }

    fn remove_sp_constraint_from_pattern(
        &mut self,
        tag: i32,
        pattern: i32,
    ) -> DdResult<Option<SpConstraint>> {
        self.reshaped();
        self.call_found(Request::RemoveSpConstraintFromPattern { tag, pattern })
    }

    fn build_subdomain(&mut self, blueprint: SubdomainBlueprint) -> DdResult<()> {
        self.call_reshaping(Request::BuildSubdomain(blueprint))
    }

    fn clear_all(&mut self) -> DdResult<()> {
        self.call_reshaping(Request::ClearAll)
    }

    fn get_element(&mut self, tag: i32) -> DdResult<Option<Box<dyn Element>>> {
        self.call_found_element(Request::GetElement(tag))
    }

    fn get_node(&mut self, tag: i32) -> DdResult<Option<Node>> {
        self.call_found(Request::GetNode(tag))
    }

    fn has_element(&mut self, tag: i32) -> DdResult<bool> {
        self.call_flag(Request::HasElement(tag))
    }

    fn has_node(&mut self, tag: i32) -> DdResult<bool> {
        self.call_flag(Request::HasNode(tag))
    }

    fn get_node_disp(&mut self, node: i32, dof: usize) -> DdResult<f64> {
        self.call(Request::GetNodeDisp { node, dof })?;
        self.read(Opcode::GetNodeDisp, |channel| channel.recv_scalar(REPLY_DB_TAG))
    }

    fn print(&mut self) -> DdResult<String> {
        self.call(Request::Print)?;
        let mut report = Report::default();
        self.read(Opcode::Print, |channel| channel.recv_obj(REPLY_DB_TAG, &mut report))?;
        Ok(report.0)
    }

    fn set_tag(&mut self, tag: i32) -> DdResult<()> {
        self.call_unit(Request::SetTag(tag))?;
        self.tag = tag;
        Ok(())
    }

    fn set_commit_tag(&mut self, tag: i32) -> DdResult<()> {
        self.call_unit(Request::SetCommitTag(tag))?;
        self.commit_tag = tag;
        Ok(())
    }

    fn set_current_time(&mut self, time: f64) -> DdResult<()> {
        self.call_mutating(Request::SetCurrentTime(time))
    }

    fn set_committed_time(&mut self, time: f64) -> DdResult<()> {
        self.call_mutating(Request::SetCommittedTime(time))
    }

    fn update_time_dt(&mut self, time: f64, dt: f64) -> DdResult<()> {
        self.call_mutating(Request::UpdateTimeDt { time, dt })
    }

    fn set_load_constant(&mut self) -> DdResult<()> {
        self.call_mutating(Request::SetLoadConstant)
    }

    fn apply_load(&mut self, time: f64) -> DdResult<()> {
        self.call_mutating(Request::ApplyLoad(time))
    }

    fn update(&mut self) -> DdResult<()> {
        self.call_mutating(Request::Update)
    }

    fn commit(&mut self) -> DdResult<()> {
        self.call_mutating(Request::Commit)
    }

    fn revert_to_last_commit(&mut self) -> DdResult<()> {
        self.call_mutating(Request::RevertToLastCommit)
    }

    fn revert_to_start(&mut self) -> DdResult<()> {
        self.call_mutating(Request::RevertToStart)
    }

    fn set_mass(&mut self, node: i32, mass: DMatrix<f64>) -> DdResult<()> {
        self.call_mutating(Request::SetMass { node, mass })
    }

    fn set_rayleigh_damping_factors(&mut self, factors: RayleighFactors) -> DdResult<()> {
        self.call_mutating(Request::SetRayleighDampingFactors(factors))
    }

    fn add_recorder(&mut self, recorder: DisplacementRecorder) -> DdResult<()> {
        self.call_unit(Request::AddRecorder(recorder))
    }

    fn remove_recorders(&mut self) -> DdResult<()> {
        self.call_unit(Request::RemoveRecorders)
    }

    fn set_domain_decomp_analysis(&mut self, config: AnalysisConfig) -> DdResult<()> {
        self.call_reshaping(Request::SetDomainDecompAnalysis(config))
    }

    fn domain_change(&mut self) -> DdResult<()> {
        self.call_reshaping(Request::DomainChange)
    }

    fn clear_analysis(&mut self) -> DdResult<()> {
        self.call_reshaping(Request::ClearAnalysis)
    }

    fn wipe_analysis(&mut self) -> DdResult<()> {
        self.call_reshaping(Request::WipeAnalysis)
    }

    fn set_analysis_algorithm(&mut self, algorithm: AlgorithmKind) -> DdResult<()> {
        self.call_mutating(Request::SetAnalysisAlgorithm(algorithm))
    }

    fn set_analysis_integrator(&mut self, integrator: LoadControl) -> DdResult<()> {
        self.call_mutating(Request::SetAnalysisIntegrator(integrator))
    }

    fn set_analysis_linear_soe(&mut self, solver: ClassTag) -> DdResult<()> {
        self.call_mutating(Request::SetAnalysisLinearSoe(solver))
    }

    fn set_analysis_convergence_test(&mut self, test: ConvergenceTest) -> DdResult<()> {
        self.call_mutating(Request::SetAnalysisConvergenceTest(test))
    }

    fn new_step(&mut self, dt: f64) -> DdResult<()> {
        self.call_mutating(Request::NewStep(dt))
    }

    fn compute_tang(&mut self) -> DdResult<()> {
        if self.tang_computed == Some(self.generation) {
            return Ok(());
        }
        self.call_unit(Request::ComputeTang)?;
        self.tang_computed = Some(self.generation);
        Ok(())
    }

    fn compute_residual(&mut self) -> DdResult<()> {
        if self.residual_computed == Some(self.generation) {
            return Ok(());
        }
        self.call_unit(Request::ComputeResidual)?;
        self.residual_computed = Some(self.generation);
        Ok(())
    }

    fn get_tang(&mut self) -> DdResult<DMatrix<f64>> {
        if let Some((generation, tangent)) = &self.tangent_cache {
            if *generation == self.generation {
                return Ok(tangent.clone());
            }
        }
        self.call(Request::GetTang)?;
        let tangent = self.read(Opcode::GetTang, |channel| channel.recv_matrix(REPLY_DB_TAG))?;
        self.check_interface(Opcode::GetTang, tangent.nrows(), tangent.ncols())?;
        self.tangent_cache = Some((self.generation, tangent.clone()));
        Ok(tangent)
    }

    fn get_resisting_force(&mut self) -> DdResult<DVector<f64>> {
        if let Some((generation, residual)) = &self.residual_cache {
            if *generation == self.generation {
                return Ok(residual.clone());
            }
        }
        self.call(Request::GetResistingForce)?;
        let residual =
            self.read(Opcode::GetResistingForce, |channel| channel.recv_vector(REPLY_DB_TAG))?;
        self.check_interface(Opcode::GetResistingForce, residual.len(), 1)?;
        self.residual_cache = Some((self.generation, residual.clone()));
        Ok(residual)
    }

    fn compute_nodal_response(&mut self, delta_ext: &DVector<f64>) -> DdResult<()> {
        self.call_mutating(Request::ComputeNodalResponse(delta_ext.clone()))
    }

    fn get_cost(&mut self) -> DdResult<f64> {
        self.call(Request::GetCost)?;
        self.read(Opcode::GetCost, |channel| channel.recv_scalar(REPLY_DB_TAG))
    }

    fn get_remote_data(&mut self) -> DdResult<RemoteData> {
        self.call(Request::GetRemoteData)?;
        let id = self.read(Opcode::GetRemoteData, |channel| channel.recv_id(REPLY_DB_TAG))?;
        let data = RemoteData::from_id(&id)?;
        self.interface_size = Some(data.num_external_eqn());
        Ok(data)
    }
}
