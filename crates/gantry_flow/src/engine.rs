//! The flow engine: the loop that drives jobs through teams.
//!
//! A job runs in phases - acquire managed objects, pre duties, the
//! function body, post duties, outcome - and may park between phases on
//! an asset. Bookkeeping happens under the process lock; user code
//! (sources, duties, function bodies, governance enactors) never does.
//! Escalation is consumed as a tagged outcome by this loop: the matched
//! handler simply becomes the thread-state's next job.

use crate::job::{FunctionContext, GovernanceOp, Outcome, SpawnRequest, WorkFunction};
use crate::metrics::KernelMetrics;
use crate::process::{
    EscalationState, FlowCell, PendingResume, ProcessCallback, ProcessState, ProcessStatus,
    ThreadCell,
};
use gantry_asset::{
    AssetKey, AssetManager, AssetRegistry, AssetWaker, Completer, CompletionLatch, LatchPark,
    ManagerIndex, WakeReason,
};
use gantry_core::{
    Clock, Fault, FunctionIndex, JobId, KernelError, KernelResult, KernelTime, ObjectIndex,
    ProcessId, ThreadIndex,
};
use gantry_govern::{
    Duty, DutyContext, DutyOutcome, DutyPhase, DutySuspension, ExtensionKind, ExtensionSet,
    Governance, GovernanceAction, GovernanceScope,
};
use gantry_model::OfficeModel;
use gantry_object::{
    BindScope, ContainerState, ManagedObjectContainer, ObjectSource, ParkOutcome, SourceBegin,
};
use gantry_team::{Assignable, Team};
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Maximum chained escalations per thread-state before the process is
/// declared fatal; bounds a handler that keeps faulting
const MAX_ESCALATION_DEPTH: u8 = 8;

/// Everything needed to build a [`FlowEngine`]
pub struct EngineSeed {
    /// Validated static metadata
    pub model: OfficeModel,
    /// Function logic, one per `model.functions` entry
    pub functions: Vec<Arc<dyn WorkFunction>>,
    /// Teams, one per `model.teams` entry
    pub teams: Vec<Arc<dyn Team>>,
    /// Object sources, one per `model.objects` entry
    pub sources: Vec<Arc<dyn ObjectSource>>,
    /// Duties, one per `model.duties` entry
    pub duties: Vec<Arc<dyn Duty>>,
    /// Governance enactors by extension surface
    pub governors: IndexMap<ExtensionKind, Arc<dyn Governance>>,
    /// Kernel clock
    pub clock: Arc<dyn Clock>,
}

pub(crate) struct EngineShared {
    pub(crate) model: OfficeModel,
    functions: Vec<Arc<dyn WorkFunction>>,
    teams: Vec<Arc<dyn Team>>,
    sources: Vec<Arc<dyn ObjectSource>>,
    duties: Vec<Arc<dyn Duty>>,
    governors: IndexMap<ExtensionKind, Arc<dyn Governance>>,
    pub(crate) assets: AssetRegistry,
    object_managers: Vec<ManagerIndex>,
    suspend_manager: ManagerIndex,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) metrics: KernelMetrics,
    processes: Mutex<IndexMap<ProcessId, Arc<ProcessState>>>,
}

/// Execution engine for one office's flows
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct FlowEngine {
    shared: Arc<EngineShared>,
}

impl FlowEngine {
    /// Build an engine from validated metadata and registrations
    ///
    /// # Errors
    ///
    /// Returns a construction error when registration tables do not line
    /// up with the model.
    pub fn new(seed: EngineSeed) -> KernelResult<Self> {
        let EngineSeed {
            model,
            functions,
            teams,
            sources,
            duties,
            governors,
            clock,
        } = seed;

        for (field, got, want) in [
            ("functions", functions.len(), model.functions.len()),
            ("teams", teams.len(), model.teams.len()),
            ("sources", sources.len(), model.objects.len()),
            ("duties", duties.len(), model.duties.len()),
        ] {
            if got != want {
                return Err(KernelError::Validation {
                    field: field.to_string(),
                    reason: format!("{got} registered, model declares {want}"),
                });
            }
        }

        let mut assets = AssetRegistry::new();
        let object_managers = model
            .objects
            .iter()
            .map(|object| {
                assets.add_manager(AssetManager::new(
                    object.name.clone(),
                    object.timeout_ms.unwrap_or(model.default_asset_timeout_ms),
                ))
            })
            .collect();
        let suspend_manager = assets.add_manager(AssetManager::new(
            "suspensions",
            model.default_asset_timeout_ms,
        ));

        Ok(Self {
            shared: Arc::new(EngineShared {
                model,
                functions,
                teams,
                sources,
                duties,
                governors,
                assets,
                object_managers,
                suspend_manager,
                clock,
                metrics: KernelMetrics::new(),
                processes: Mutex::new(IndexMap::new()),
            }),
        })
    }

    /// Static metadata this engine executes
    #[must_use]
    pub fn model(&self) -> &OfficeModel {
        &self.shared.model
    }

    /// Instrumentation counters
    #[must_use]
    pub fn metrics(&self) -> &KernelMetrics {
        &self.shared.metrics
    }

    /// Kernel clock
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.shared.clock
    }

    /// Instigate a new process-state at the given entry function
    ///
    /// # Errors
    ///
    /// Returns a construction error for an out-of-range entry index.
    pub fn instigate(
        &self,
        entry: FunctionIndex,
        parameter: Value,
        callback: Option<ProcessCallback>,
    ) -> KernelResult<Arc<ProcessState>> {
        if entry.index() >= self.shared.model.functions.len() {
            return Err(KernelError::IndexOutOfRange {
                field: "entry function".to_string(),
                index: entry.index(),
                len: self.shared.model.functions.len(),
            });
        }

        let process = Arc::new(ProcessState::new(false, callback));
        {
            let mut inner = process.lock();
            inner.flows.push(FlowCell {
                remaining: 1,
                parent: None,
            });
            inner.threads.push(ThreadCell::new(0));
            inner.live_threads = 1;
        }
        self.register_process(&process);
        KernelMetrics::bump(&self.shared.metrics.processes_started);
        tracing::debug!(process = %process.id(), entry = %entry, "process instigated");

        dispatch(Job::fresh(
            Arc::clone(&self.shared),
            Arc::clone(&process),
            ThreadIndex::new(0),
            entry,
            parameter,
        ));
        Ok(process)
    }

    /// Create the privileged office-management process
    ///
    /// It owns no thread-states and never completes on its own; the
    /// office retires it at shutdown.
    #[must_use]
    pub fn instigate_management(&self) -> Arc<ProcessState> {
        let process = Arc::new(ProcessState::new(true, None));
        self.register_process(&process);
        process
    }

    /// Retire a process without running it (management shutdown)
    pub fn retire(&self, process: &Arc<ProcessState>) {
        {
            let mut inner = process.lock();
            if inner.status == ProcessStatus::Running {
                inner.status = ProcessStatus::Resolved;
            }
        }
        process.done.notify_all();
        self.unregister_process(process.id());
    }

    /// Request cancellation of a process
    ///
    /// Implemented as a forced escalation: parked thread-states are woken
    /// with a cancellation fault immediately; running jobs observe it at
    /// their next outcome boundary.
    pub fn cancel(&self, process: &Arc<ProcessState>) {
        let parked = {
            let mut inner = process.lock();
            if inner.status != ProcessStatus::Running || inner.cancelling {
                return;
            }
            inner.cancelling = true;
            let mut parked = Vec::new();
            for cell in &mut inner.threads {
                if let Some(slot) = cell.parked.take() {
                    parked.push(slot);
                }
            }
            parked
        };
        tracing::debug!(process = %process.id(), "cancellation requested");

        for (manager, key) in parked {
            if let Ok(waker) = self.shared.assets.with_manager(manager, |m| m.force(key)) {
                waker(WakeReason::Cancelled(Fault::cancelled()));
            }
        }
    }

    /// Cancel every live non-management process
    pub fn cancel_all(&self) {
        let processes: Vec<Arc<ProcessState>> = self
            .shared
            .processes
            .lock()
            .expect("process table lock poisoned")
            .values()
            .filter(|p| !p.is_management())
            .cloned()
            .collect();
        for process in processes {
            self.cancel(&process);
        }
    }

    /// Sweep asset managers and wake timed-out jobs
    ///
    /// Invoked once per office-manager tick, in the management process's
    /// context.
    pub fn tick(&self, now: KernelTime) {
        let fired = self.shared.assets.check_all(now);
        for (waker, fault) in fired {
            KernelMetrics::bump(&self.shared.metrics.timeouts);
            waker(WakeReason::TimedOut(fault));
        }
    }

    /// Number of live processes, the management process included
    #[must_use]
    pub fn live_processes(&self) -> usize {
        self.shared
            .processes
            .lock()
            .expect("process table lock poisoned")
            .len()
    }

    fn register_process(&self, process: &Arc<ProcessState>) {
        self.shared
            .processes
            .lock()
            .expect("process table lock poisoned")
            .insert(process.id(), Arc::clone(process));
    }

    fn unregister_process(&self, id: ProcessId) {
        self.shared
            .processes
            .lock()
            .expect("process table lock poisoned")
            .shift_remove(&id);
    }
}

/// Phase a job resumes at after a park
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Acquire,
    Pre(usize),
    Body,
    Post(usize),
    Finish,
}

/// One scheduled function invocation
struct Job {
    id: JobId,
    shared: Arc<EngineShared>,
    process: Arc<ProcessState>,
    thread: ThreadIndex,
    function: FunctionIndex,
    parameter: Value,
    phase: Phase,
    /// Function-scoped containers for this invocation
    fn_objects: IndexMap<ObjectIndex, Arc<ManagedObjectContainer>>,
    /// Child flows requested by the body and its duties
    spawns: Vec<SpawnRequest>,
    /// Explicit continuation from `Outcome::Next`
    next_override: Option<FunctionIndex>,
}

impl Job {
    fn fresh(
        shared: Arc<EngineShared>,
        process: Arc<ProcessState>,
        thread: ThreadIndex,
        function: FunctionIndex,
        parameter: Value,
    ) -> Self {
        Self {
            id: JobId::new(),
            shared,
            process,
            thread,
            function,
            parameter,
            phase: Phase::Acquire,
            fn_objects: IndexMap::new(),
            spawns: Vec::new(),
            next_override: None,
        }
    }
}

impl Assignable for Job {
    fn run(self: Box<Self>) {
        run_job(*self);
    }
}

/// Hand a job to its function's team, escalating refusals
fn dispatch(job: Job) {
    let shared = Arc::clone(&job.shared);
    let process = Arc::clone(&job.process);
    let thread = job.thread;
    let function = job.function;

    let team_index = shared.model.functions[function.index()].team;
    let team = &shared.teams[team_index.index()];
    KernelMetrics::bump(&shared.metrics.jobs_dispatched);
    tracing::trace!(job = %job.id, %function, team = team.name(), "job dispatched");

    if let Err(refusal) = team.assign(Box::new(job)) {
        KernelMetrics::bump(&shared.metrics.refusals);
        let fault = Fault::refused(refusal.team.clone()).in_function(function);
        drop(refusal);
        escalate(&shared, &process, thread, fault, Vec::new());
    }
}

/// Walk escalation resolution for a fault on one thread-state
///
/// The matched handler becomes the thread-state's next job; unmatched
/// faults (and contract faults, which never match) end the process
/// `Fatal`.
fn escalate(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    thread: ThreadIndex,
    fault: Fault,
    abandoned: Vec<Arc<ManagedObjectContainer>>,
) {
    recycle_all(&abandoned);
    let mut fault = fault;

    loop {
        KernelMetrics::bump(&shared.metrics.escalations);
        let handler = {
            let mut inner = process.lock();
            if inner.status != ProcessStatus::Running {
                return;
            }
            let cell = &mut inner.threads[thread.index()];
            cell.running = false;
            cell.parked = None;
            cell.escalation_depth = cell.escalation_depth.saturating_add(1);

            if cell.escalation_depth > MAX_ESCALATION_DEPTH {
                tracing::error!(process = %process.id(), %thread, "escalation depth exhausted");
                None
            } else {
                select_handler(&shared.model, &fault)
            }
        };

        tracing::warn!(process = %process.id(), %thread, %fault, handler = ?handler, "escalating");

        match handler {
            Some(handler) => {
                {
                    let mut inner = process.lock();
                    inner.threads[thread.index()].escalation = EscalationState::Escalating;
                }
                let parameter = serde_json::to_value(&fault).unwrap_or(Value::Null);
                let job = Job::fresh(
                    Arc::clone(shared),
                    Arc::clone(process),
                    thread,
                    handler,
                    parameter,
                );

                let team_index = shared.model.functions[handler.index()].team;
                let team = &shared.teams[team_index.index()];
                KernelMetrics::bump(&shared.metrics.jobs_dispatched);
                match team.assign(Box::new(job)) {
                    Ok(()) => return,
                    Err(refusal) => {
                        KernelMetrics::bump(&shared.metrics.refusals);
                        fault = Fault::refused(refusal.team.clone()).in_function(handler);
                        drop(refusal);
                    }
                }
            }
            None => {
                fatal_teardown(shared, process, fault);
                return;
            }
        }
    }
}

/// Handler selection: the faulted function's table first, then the
/// office table
fn select_handler(model: &OfficeModel, fault: &Fault) -> Option<FunctionIndex> {
    fault
        .function
        .and_then(|f| model.functions[f.index()].escalations.select(fault))
        .or_else(|| model.escalations.select(fault))
}

/// Mark the process fatal, tear every thread-state down, force-recycle
/// all containers, and report the fault
fn fatal_teardown(shared: &Arc<EngineShared>, process: &Arc<ProcessState>, fault: Fault) {
    let mut recycle = Vec::new();
    let mut parked = Vec::new();
    let callback = {
        let mut inner = process.lock();
        if inner.status != ProcessStatus::Running {
            return;
        }
        inner.status = ProcessStatus::Fatal(fault.clone());
        KernelMetrics::bump(&shared.metrics.processes_fatal);
        for cell in &mut inner.threads {
            cell.done = true;
            cell.running = false;
            cell.escalation = EscalationState::Fatal;
            if let Some(slot) = cell.parked.take() {
                parked.push(slot);
            }
            recycle.extend(cell.objects.drain(..).map(|(_, c)| c));
            cell.governance.clear();
        }
        inner.live_threads = 0;
        recycle.extend(inner.objects.drain(..).map(|(_, c)| c));
        inner.callback.take()
    };
    process.done.notify_all();
    tracing::error!(process = %process.id(), %fault, "process fatal");

    // Parked continuations die with the process
    for (manager, key) in parked {
        let _ = shared.assets.with_manager(manager, |m| m.force(key));
    }
    recycle_all(&recycle);
    if let Some(callback) = callback {
        callback(Err(fault));
    }
    shared
        .processes
        .lock()
        .expect("process table lock poisoned")
        .shift_remove(&process.id());
}

fn recycle_all(containers: &[Arc<ManagedObjectContainer>]) {
    for container in containers {
        if let Err(err) = container.recycle() {
            tracing::error!(%err, "recycle failed during teardown");
        }
    }
}

/// Build the continuation waker for a parked job
fn job_waker(job: Job) -> AssetWaker {
    Box::new(move |reason| match reason {
        WakeReason::Completed => dispatch(job),
        other => {
            if let Some(fault) = other.into_fault() {
                let shared = Arc::clone(&job.shared);
                let process = Arc::clone(&job.process);
                let thread = job.thread;
                let function = job.function;
                let abandoned: Vec<_> = job.fn_objects.into_values().collect();
                escalate(
                    &shared,
                    &process,
                    thread,
                    fault.in_function(function),
                    abandoned,
                );
            }
        }
    })
}

/// Completer routing an external completion through the asset manager,
/// so the waiting job fires exactly once and resumes on its own team
fn manager_completer(
    shared: Arc<EngineShared>,
    manager: ManagerIndex,
    key: AssetKey,
) -> Completer {
    Box::new(move |result| {
        let withdrawn = shared.assets.with_manager(manager, |m| m.complete(key));
        if let Ok(waker) = withdrawn {
            match result {
                Ok(()) => waker(WakeReason::Completed),
                Err(fault) => waker(WakeReason::Failed(fault)),
            }
        }
    })
}

/// Park a job on a manager; returns the key for the completer
fn park_job(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    thread: ThreadIndex,
    manager: ManagerIndex,
    label: &str,
    timeout_ms: Option<u64>,
    job: Job,
) -> AssetKey {
    let now = shared.clock.now();
    let waker = job_waker(job);
    let key = shared
        .assets
        .with_manager(manager, |m| m.register(label, timeout_ms, now, waker));

    let mut inner = process.lock();
    let cell = &mut inner.threads[thread.index()];
    cell.running = false;
    cell.parked = Some((manager, key));
    drop(inner);
    KernelMetrics::bump(&shared.metrics.jobs_suspended);
    key
}

/// Withdraw a just-registered asset because completion raced ahead, and
/// deliver the result through the normal wake path
fn withdraw_and_wake(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    thread: ThreadIndex,
    manager: ManagerIndex,
    key: AssetKey,
    result: Result<(), Fault>,
) {
    {
        let mut inner = process.lock();
        inner.threads[thread.index()].parked = None;
    }
    if let Ok(waker) = shared.assets.with_manager(manager, |m| m.complete(key)) {
        match result {
            Ok(()) => waker(WakeReason::Completed),
            Err(fault) => waker(WakeReason::Failed(fault)),
        }
    }
}

/// Resolve the container for a binding, creating it in its scope on
/// first use
fn resolve_container(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    thread: ThreadIndex,
    fn_objects: &mut IndexMap<ObjectIndex, Arc<ManagedObjectContainer>>,
    object: ObjectIndex,
) -> Arc<ManagedObjectContainer> {
    let model = &shared.model.objects[object.index()];
    let create = || {
        Arc::new(ManagedObjectContainer::new(
            model.name.clone(),
            model.policy,
            shared.sources[object.index()].pool(),
        ))
    };
    match model.scope {
        BindScope::Process => {
            let mut inner = process.lock();
            Arc::clone(inner.objects.entry(object).or_insert_with(create))
        }
        BindScope::Thread => {
            let mut inner = process.lock();
            Arc::clone(
                inner.threads[thread.index()]
                    .objects
                    .entry(object)
                    .or_insert_with(create),
            )
        }
        BindScope::Function => Arc::clone(fn_objects.entry(object).or_insert_with(create)),
    }
}

/// Collect the bindings a job needs: the function's own objects plus
/// everything its duties administer, in first-reference order
fn required_objects(shared: &EngineShared, function: FunctionIndex) -> Vec<ObjectIndex> {
    let fn_model = &shared.model.functions[function.index()];
    let mut required = fn_model.objects.clone();
    for duty in fn_model.pre_duties.iter().chain(&fn_model.post_duties) {
        for object in &shared.model.duties[duty.index()].objects {
            if !required.contains(object) {
                required.push(*object);
            }
        }
    }
    required
}

/// Duty context handed to administration hooks
struct EngineDutyContext<'a> {
    phase: DutyPhase,
    extensions: ExtensionSet<'a>,
    instigated: Vec<SpawnRequest>,
    latch: Option<CompletionLatch>,
}

impl DutyContext for EngineDutyContext<'_> {
    fn phase(&self) -> DutyPhase {
        self.phase
    }

    fn extensions(&self) -> &ExtensionSet<'_> {
        &self.extensions
    }

    fn instigate(&mut self, function: FunctionIndex, parameter: Value) {
        self.instigated.push(SpawnRequest {
            function,
            parameter,
        });
    }

    fn suspender(&mut self) -> DutySuspension {
        self.latch.get_or_insert_with(CompletionLatch::new).handle()
    }
}

/// Drive one job through its phases
#[allow(clippy::too_many_lines)]
fn run_job(mut job: Job) {
    let shared = Arc::clone(&job.shared);
    let process = Arc::clone(&job.process);
    let thread = job.thread;

    // Entry bookkeeping: observe the single-active-job discipline
    {
        let mut inner = process.lock();
        if inner.status != ProcessStatus::Running {
            return;
        }
        let cell = &mut inner.threads[thread.index()];
        if cell.running {
            KernelMetrics::bump(&shared.metrics.overlap_violations);
            tracing::error!(process = %process.id(), %thread, "second job entered a thread-state");
        }
        cell.running = true;
        cell.parked = None;
    }

    loop {
        match job.phase {
            Phase::Acquire => {
                match acquire_objects(&shared, &process, &mut job) {
                    AcquireResult::Ready => job.phase = Phase::Pre(0),
                    AcquireResult::Parked => return,
                    AcquireResult::Faulted(fault) => {
                        let abandoned: Vec<_> = job.fn_objects.into_values().collect();
                        escalate(
                            &shared,
                            &process,
                            thread,
                            fault.in_function(job.function),
                            abandoned,
                        );
                        return;
                    }
                }
            }
            Phase::Pre(i) | Phase::Post(i) => {
                let (duties, resume_phase, next_phase): (Vec<_>, _, _) = {
                    let fn_model = &shared.model.functions[job.function.index()];
                    match job.phase {
                        Phase::Pre(_) => (fn_model.pre_duties.clone(), Phase::Pre(i + 1), Phase::Body),
                        _ => (fn_model.post_duties.clone(), Phase::Post(i + 1), Phase::Finish),
                    }
                };
                if i >= duties.len() {
                    job.phase = next_phase;
                    continue;
                }
                match run_duty(&shared, &process, &mut job, duties[i], resume_phase) {
                    StepResult::Continue => job.phase = resume_phase,
                    StepResult::Parked => return,
                    StepResult::Faulted(fault) => {
                        let abandoned: Vec<_> = job.fn_objects.into_values().collect();
                        escalate(
                            &shared,
                            &process,
                            thread,
                            fault.in_function(job.function),
                            abandoned,
                        );
                        return;
                    }
                }
            }
            Phase::Body => match run_body(&shared, &process, &mut job) {
                StepResult::Continue => job.phase = Phase::Post(0),
                StepResult::Parked => return,
                StepResult::Faulted(fault) => {
                    let abandoned: Vec<_> = job.fn_objects.into_values().collect();
                    escalate(
                        &shared,
                        &process,
                        thread,
                        fault.in_function(job.function),
                        abandoned,
                    );
                    return;
                }
            },
            Phase::Finish => {
                finish_job(&shared, &process, job);
                return;
            }
        }
    }
}

enum AcquireResult {
    Ready,
    Parked,
    Faulted(Fault),
}

enum StepResult {
    Continue,
    Parked,
    Faulted(Fault),
}

/// Ensure every bound managed object is ready, sourcing and parking as
/// needed
fn acquire_objects(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    job: &mut Job,
) -> AcquireResult {
    let required = required_objects(shared, job.function);

    for object in required {
        let container = resolve_container(shared, process, job.thread, &mut job.fn_objects, object);

        loop {
            match container.state() {
                ContainerState::Ready | ContainerState::InUse => break,
                ContainerState::Unsourced => {
                    match container.begin_sourcing() {
                        Ok(SourceBegin::Ready) => break,
                        Ok(SourceBegin::Pending) => {
                            let source = &shared.sources[object.index()];
                            if let Err(fault) = source.source(container.sourcing_handle()) {
                                container.sourcing_handle().fail(fault.clone());
                                return AcquireResult::Faulted(fault);
                            }
                            // Re-examine: the source may have supplied
                            // synchronously
                        }
                        Err(err) => {
                            return AcquireResult::Faulted(Fault::contract(err.to_string()));
                        }
                    }
                }
                ContainerState::Sourcing => {
                    // Park this job until the supply arrives; resumption
                    // re-enters Acquire, which is idempotent
                    let manager = shared.object_managers[object.index()];
                    let label = container.name().to_string();
                    let thread = job.thread;
                    let parked_job = std::mem::replace(
                        job,
                        Job::fresh(
                            Arc::clone(shared),
                            Arc::clone(process),
                            thread,
                            FunctionIndex::new(0),
                            Value::Null,
                        ),
                    );
                    let key = park_job(shared, process, thread, manager, &label, None, parked_job);
                    let completer = manager_completer(Arc::clone(shared), manager, key);
                    match container.park(completer) {
                        ParkOutcome::Parked => return AcquireResult::Parked,
                        ParkOutcome::AlreadyReady => {
                            withdraw_and_wake(shared, process, thread, manager, key, Ok(()));
                            return AcquireResult::Parked;
                        }
                        ParkOutcome::Failed(fault) => {
                            withdraw_and_wake(shared, process, thread, manager, key, Err(fault));
                            return AcquireResult::Parked;
                        }
                    }
                }
                ContainerState::Failed => {
                    let fault = container.failure().unwrap_or_else(|| {
                        Fault::sourcing(container.name(), "sourcing failed")
                    });
                    return AcquireResult::Faulted(fault);
                }
                state @ (ContainerState::Recycling | ContainerState::Recycled) => {
                    return AcquireResult::Faulted(Fault::contract(format!(
                        "container {} acquired in {}",
                        container.name(),
                        state
                    )));
                }
            }
        }
    }
    AcquireResult::Ready
}

/// Run one administration duty
fn run_duty(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    job: &mut Job,
    duty: gantry_core::DutyIndex,
    resume_phase: Phase,
) -> StepResult {
    let duty_model = &shared.model.duties[duty.index()];
    let containers: Vec<(ObjectIndex, Arc<ManagedObjectContainer>)> = duty_model
        .objects
        .iter()
        .map(|&object| {
            (
                object,
                resolve_container(shared, process, job.thread, &mut job.fn_objects, object),
            )
        })
        .collect();
    let borrowed: Vec<(ObjectIndex, &ManagedObjectContainer)> = containers
        .iter()
        .map(|(index, container)| (*index, container.as_ref()))
        .collect();

    let mut ctx = EngineDutyContext {
        phase: duty_model.phase,
        extensions: ExtensionSet::new(borrowed),
        instigated: Vec::new(),
        latch: None,
    };
    let result = shared.duties[duty.index()].administer(&mut ctx);
    let EngineDutyContext {
        instigated, latch, ..
    } = ctx;
    job.spawns.extend(instigated);

    match result {
        Ok(DutyOutcome::Done) => StepResult::Continue,
        Ok(DutyOutcome::Suspended) => {
            let Some(latch) = latch else {
                return StepResult::Faulted(Fault::contract(format!(
                    "duty {} suspended without a suspender",
                    duty_model.name
                )));
            };
            let label = format!("duty {}", duty_model.name);
            park_on_latch(shared, process, job, latch, &label, None, resume_phase)
        }
        Err(fault) => StepResult::Faulted(fault),
    }
}

/// Run the function body and apply its buffered governance operations
fn run_body(shared: &Arc<EngineShared>, process: &Arc<ProcessState>, job: &mut Job) -> StepResult {
    let fn_model = &shared.model.functions[job.function.index()];
    let containers: Vec<(ObjectIndex, Arc<ManagedObjectContainer>)> = fn_model
        .objects
        .iter()
        .map(|&object| {
            (
                object,
                resolve_container(shared, process, job.thread, &mut job.fn_objects, object),
            )
        })
        .collect();

    let mut ctx = FunctionContext::new(&job.parameter, &containers);
    let result = shared.functions[job.function.index()].execute(&mut ctx);

    let spawns = std::mem::take(&mut ctx.spawns);
    let governance_ops = std::mem::take(&mut ctx.governance_ops);
    let suspension = ctx.suspension.take();
    drop(ctx);
    job.spawns.extend(spawns);

    if let Err(fault) = apply_governance(shared, process, job, governance_ops) {
        return StepResult::Faulted(fault);
    }

    match result {
        Ok(Outcome::Complete) => StepResult::Continue,
        Ok(Outcome::Next(next)) => {
            if next.index() >= shared.model.functions.len() {
                return StepResult::Faulted(Fault::contract(format!(
                    "continuation {next} out of range"
                )));
            }
            job.next_override = Some(next);
            StepResult::Continue
        }
        Ok(Outcome::Suspend) => {
            let Some(request) = suspension else {
                return StepResult::Faulted(Fault::contract(
                    "function suspended without registering an asset",
                ));
            };
            park_on_latch(
                shared,
                process,
                job,
                request.latch,
                &request.label,
                request.timeout_ms,
                Phase::Post(0),
            )
        }
        Err(fault) => StepResult::Faulted(fault),
    }
}

/// Park the current job on a completion latch via the suspension manager
fn park_on_latch(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    job: &mut Job,
    latch: CompletionLatch,
    label: &str,
    timeout_ms: Option<u64>,
    resume_phase: Phase,
) -> StepResult {
    let thread = job.thread;
    let mut parked_job = std::mem::replace(
        job,
        Job::fresh(
            Arc::clone(shared),
            Arc::clone(process),
            thread,
            FunctionIndex::new(0),
            Value::Null,
        ),
    );
    parked_job.phase = resume_phase;

    let manager = shared.suspend_manager;
    let key = park_job(shared, process, thread, manager, label, timeout_ms, parked_job);
    let completer = manager_completer(Arc::clone(shared), manager, key);
    match latch.park(completer) {
        LatchPark::Parked => StepResult::Parked,
        LatchPark::AlreadyResolved(result) => {
            withdraw_and_wake(shared, process, thread, manager, key, result);
            StepResult::Parked
        }
    }
}

/// Apply buffered governance operations in declaration order
fn apply_governance(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    job: &mut Job,
    ops: Vec<GovernanceOp>,
) -> Result<(), Fault> {
    for op in ops {
        match op {
            GovernanceOp::Activate(kind) => {
                let candidates = shared.model.objects_with_extension(&kind);
                let mut inner = process.lock();
                let members: Vec<ObjectIndex> = candidates
                    .into_iter()
                    .filter(|object| {
                        inner.objects.contains_key(object)
                            || inner.threads[job.thread.index()].objects.contains_key(object)
                            || job.fn_objects.contains_key(object)
                    })
                    .collect();
                inner.threads[job.thread.index()]
                    .governance
                    .push(GovernanceScope::activate(kind, members));
            }
            GovernanceOp::Commit(kind) => {
                close_governance(shared, process, job, kind, GovernanceAction::Commit)?;
            }
            GovernanceOp::Disregard(kind) => {
                close_governance(shared, process, job, kind, GovernanceAction::Disregard)?;
            }
        }
    }
    Ok(())
}

/// Close the innermost open scope for a surface and run its enactor
fn close_governance(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    job: &mut Job,
    kind: ExtensionKind,
    action: GovernanceAction,
) -> Result<(), Fault> {
    let members = {
        let mut inner = process.lock();
        let cell = &mut inner.threads[job.thread.index()];
        let scope = cell
            .governance
            .iter_mut()
            .rev()
            .find(|scope| scope.kind() == &kind && scope.is_open())
            .ok_or_else(|| Fault::contract(format!("no open governance scope for {kind}")))?;
        scope
            .close(action)
            .map_err(|err| Fault::contract(err.to_string()))?
            .to_vec()
    };
    enact_governance(shared, process, job, &kind, action, &members)
}

/// Invoke the registered enactor for a closed scope
fn enact_governance(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    job: &mut Job,
    kind: &ExtensionKind,
    action: GovernanceAction,
    members: &[ObjectIndex],
) -> Result<(), Fault> {
    let Some(governor) = shared.governors.get(kind) else {
        return Ok(());
    };
    let containers: Vec<(ObjectIndex, Arc<ManagedObjectContainer>)> = members
        .iter()
        .map(|&object| {
            (
                object,
                resolve_container(shared, process, job.thread, &mut job.fn_objects, object),
            )
        })
        .collect();
    let borrowed: Vec<(ObjectIndex, &ManagedObjectContainer)> = containers
        .iter()
        .map(|(index, container)| (*index, container.as_ref()))
        .collect();
    governor.enact(action, &ExtensionSet::new(borrowed))
}

/// Consume the job's outcome under the process lock
#[allow(clippy::too_many_lines)]
fn finish_job(shared: &Arc<EngineShared>, process: &Arc<ProcessState>, job: Job) {
    let Job {
        thread,
        function,
        parameter,
        fn_objects,
        spawns,
        next_override,
        ..
    } = job;

    let next = next_override.or(shared.model.functions[function.index()].next);

    let mut dispatches: Vec<Job> = Vec::new();
    let mut recycle: Vec<Arc<ManagedObjectContainer>> = fn_objects.into_values().collect();
    let mut callback: Option<(ProcessCallback, Result<(), Fault>)> = None;
    let mut remove = false;
    let mut inject_cancel = false;

    {
        let mut inner = process.lock();
        if inner.status != ProcessStatus::Running {
            drop(inner);
            recycle_all(&recycle);
            return;
        }
        KernelMetrics::bump(&shared.metrics.jobs_completed);

        let continuing = !spawns.is_empty() || next.is_some();
        {
            let cancelling = inner.cancelling;
            let cell = &mut inner.threads[thread.index()];
            cell.running = false;
            // A consumed outcome resets the handler-loop bound
            cell.escalation_depth = 0;
            if cancelling && cell.escalation == EscalationState::Normal && continuing {
                inject_cancel = true;
            }
        }

        if inject_cancel {
            // Forced escalation replaces the continuation
        } else if !spawns.is_empty() {
            // Fork: children join a fresh flow; the parent resumes only
            // when the counter drains
            let flow_index = inner.flows.len();
            inner.flows.push(FlowCell {
                remaining: spawns.len(),
                parent: next.map(|function| PendingResume {
                    thread,
                    function,
                    parameter: parameter.clone(),
                }),
            });
            for spawn in spawns {
                let child_index = ThreadIndex::new(inner.threads.len());
                inner.threads.push(ThreadCell::new(flow_index));
                inner.live_threads += 1;
                dispatches.push(Job::fresh(
                    Arc::clone(shared),
                    Arc::clone(process),
                    child_index,
                    spawn.function,
                    spawn.parameter,
                ));
            }
            if next.is_none() {
                // Nothing to resume; the thread's chain ends here
                thread_finished(
                    shared,
                    process,
                    &mut inner,
                    thread,
                    &mut dispatches,
                    &mut recycle,
                    &mut callback,
                    &mut remove,
                );
            }
        } else if let Some(next) = next {
            dispatches.push(Job::fresh(
                Arc::clone(shared),
                Arc::clone(process),
                thread,
                next,
                parameter,
            ));
        } else {
            thread_finished(
                shared,
                process,
                &mut inner,
                thread,
                &mut dispatches,
                &mut recycle,
                &mut callback,
                &mut remove,
            );
        }
    }

    if inject_cancel {
        escalate(shared, process, thread, Fault::cancelled(), recycle);
        return;
    }

    process.done.notify_all();
    recycle_all(&recycle);
    for dispatchable in dispatches {
        dispatch(dispatchable);
    }
    if let Some((callback, result)) = callback {
        callback(result);
    }
    if remove {
        shared
            .processes
            .lock()
            .expect("process table lock poisoned")
            .shift_remove(&process.id());
    }
}

/// A thread-state's chain is exhausted; settle join accounting and, when
/// it was the last one, complete the process
#[allow(clippy::too_many_arguments)]
fn thread_finished(
    shared: &Arc<EngineShared>,
    process: &Arc<ProcessState>,
    inner: &mut crate::process::ProcessInner,
    thread: ThreadIndex,
    dispatches: &mut Vec<Job>,
    recycle: &mut Vec<Arc<ManagedObjectContainer>>,
    callback: &mut Option<(ProcessCallback, Result<(), Fault>)>,
    remove: &mut bool,
) {
    let flow_index = {
        let cell = &mut inner.threads[thread.index()];
        cell.done = true;
        cell.running = false;
        if cell.escalation == EscalationState::Escalating {
            cell.escalation = EscalationState::Resolved;
        }
        recycle.extend(cell.objects.drain(..).map(|(_, c)| c));
        for scope in &mut cell.governance {
            if scope.is_open() {
                // Unresolved scopes are disregarded at flow end
                let _ = scope.close(GovernanceAction::Disregard);
            }
        }
        cell.governance.clear();
        cell.flow
    };

    let flow = &mut inner.flows[flow_index];
    flow.remaining -= 1;
    if flow.remaining == 0 {
        if let Some(resume) = flow.parent.take() {
            // The last decrement fires the parent's continuation from
            // this team context
            dispatches.push(Job::fresh(
                Arc::clone(shared),
                Arc::clone(process),
                resume.thread,
                resume.function,
                resume.parameter,
            ));
        }
    }

    inner.live_threads -= 1;
    if inner.live_threads == 0 {
        if inner.status == ProcessStatus::Running {
            inner.status = ProcessStatus::Resolved;
            KernelMetrics::bump(&shared.metrics.processes_resolved);
        }
        recycle.extend(inner.objects.drain(..).map(|(_, c)| c));
        let result = match &inner.status {
            ProcessStatus::Fatal(fault) => Err(fault.clone()),
            _ => Ok(()),
        };
        if let Some(cb) = inner.callback.take() {
            *callback = Some((cb, result));
        }
        *remove = true;
        tracing::debug!(process = %process.id(), "process completed");
    }
}
