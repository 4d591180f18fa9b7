//! End-to-end flows through a full office: chains across worker teams,
//! escalation routing, asynchronous managed-object sourcing, duties,
//! governance, fork/join, and cancellation.

use gantry_core::{Fault, FaultKind};
use gantry_flow::{FnWork, FunctionContext, Outcome, WorkFunction};
use gantry_govern::{
    Duty, DutyContext, DutyOutcome, DutyPhase, DutySuspension, ExtensionKind, ExtensionSet,
    Governance, GovernanceAction,
};
use gantry_model::{
    DutyModel, EscalationTable, FaultMatch, FunctionModel, KindPattern, ObjectModel, OfficeModel,
    TeamModel,
};
use gantry_object::{ObjectSource, SourcingHandle};
use gantry_office::{OfficeBuilder, ProcessStatus};
use gantry_team::{PassiveTeam, WorkerTeam};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn recorder(log: &Log, name: &str) -> Arc<dyn WorkFunction> {
    let log = Arc::clone(log);
    let name = name.to_string();
    Arc::new(FnWork::new(move |_ctx: &mut FunctionContext<'_>| {
        log.lock().unwrap().push(name.clone());
        Ok(Outcome::Complete)
    }))
}

#[test]
fn chain_then_fault_routes_to_handler_and_resolves() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(0);
    let fast = model.add_team(TeamModel::new("fast"));
    let handler = model.add_function(FunctionModel::new("on_timeout", fast));
    let b = model.add_function(FunctionModel::new("b", fast));
    let a = model.add_function(FunctionModel::new("a", fast).with_next(b));
    model.escalations =
        EscalationTable::new().with_entry(FaultMatch::Kind(KindPattern::Timeout), handler);
    let _ = a;

    let log: Log = Arc::default();
    let log_b = Arc::clone(&log);
    let failing_b = Arc::new(FnWork::new(move |_ctx: &mut FunctionContext<'_>| {
        log_b.lock().unwrap().push("b".to_string());
        Err(Fault::new(FaultKind::Timeout, "simulated upstream timeout"))
    }));

    let office = OfficeBuilder::new(model)
        .register_function("on_timeout", recorder(&log, "handled"))
        .register_function("b", failing_b)
        .register_function("a", recorder(&log, "a"))
        .register_team("fast", Arc::new(WorkerTeam::new("fast", 2)))
        .build()
        .unwrap();
    office.start();

    let handle = office.instigate("a", Value::Null, None).unwrap();
    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["a", "b", "handled"]);
    let snapshot = office.metrics().snapshot();
    assert_eq!(snapshot.escalations, 1);
    assert_eq!(snapshot.processes_resolved, 1);
    assert_eq!(snapshot.overlap_violations, 0);
    office.stop();
}

struct DbConn {
    hits: u32,
}

/// Source that supplies from a separate, deliberately foreign thread
struct DeferredSource {
    delay: Duration,
}

impl ObjectSource for DeferredSource {
    fn source(&self, handle: SourcingHandle) -> Result<(), Fault> {
        let delay = self.delay;
        std::thread::Builder::new()
            .name("external-supplier".to_string())
            .spawn(move || {
                std::thread::sleep(delay);
                handle.supply(Box::new(DbConn { hits: 0 }));
            })
            .map_err(|err| Fault::sourcing("db", err.to_string()))?;
        Ok(())
    }
}

#[test]
fn async_sourcing_resumes_on_the_owning_team() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(10);
    let team = model.add_team(TeamModel::new("io-team"));
    let db = model.add_object(ObjectModel::new("db").with_timeout_ms(2_000));
    model.add_function(FunctionModel::new("query", team).with_object(db));

    let seen_thread: Arc<Mutex<Option<String>>> = Arc::default();
    let seen = Arc::clone(&seen_thread);
    let query = Arc::new(FnWork::new(move |ctx: &mut FunctionContext<'_>| {
        let hits = ctx.object::<DbConn, _>(0, |conn| {
            conn.hits += 1;
            conn.hits
        })?;
        assert_eq!(hits, 1);
        *seen.lock().unwrap() = std::thread::current().name().map(String::from);
        Ok(Outcome::Complete)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("query", query)
        .register_team("io-team", Arc::new(WorkerTeam::new("io-team", 2)))
        .register_source(
            "db",
            Arc::new(DeferredSource {
                delay: Duration::from_millis(50),
            }),
        )
        .build()
        .unwrap();
    office.start();

    let handle = office.instigate("query", Value::Null, None).unwrap();
    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    // The job resumed on a team worker, not on the supplier's thread
    let thread_name = seen_thread.lock().unwrap().clone().unwrap();
    assert!(thread_name.starts_with("io-team"), "ran on {thread_name}");
    assert_eq!(office.metrics().snapshot().jobs_suspended, 1);
    office.stop();
}

#[test]
fn fork_join_fires_parent_continuation_once() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(0);
    let pool = model.add_team(TeamModel::new("pool"));
    let join = model.add_function(FunctionModel::new("join", pool));
    let child = model.add_function(FunctionModel::new("child", pool));
    model.add_function(FunctionModel::new("fork", pool).with_next(join));

    let join_count = Arc::new(AtomicUsize::new(0));
    let children_done = Arc::new(AtomicUsize::new(0));

    let children = Arc::clone(&children_done);
    let child_fn = Arc::new(FnWork::new(move |ctx: &mut FunctionContext<'_>| {
        // Stagger the children so one finishes well after the other
        let delay = ctx.parameter().as_u64().unwrap_or(0);
        std::thread::sleep(Duration::from_millis(delay));
        children.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::Complete)
    }));

    let joins = Arc::clone(&join_count);
    let children_at_join = Arc::clone(&children_done);
    let join_fn = Arc::new(FnWork::new(move |_ctx: &mut FunctionContext<'_>| {
        // Both children completed before the join continuation fires
        assert_eq!(children_at_join.load(Ordering::SeqCst), 2);
        joins.fetch_add(1, Ordering::SeqCst);
        Ok(Outcome::Complete)
    }));

    let fork_fn = Arc::new(FnWork::new(move |ctx: &mut FunctionContext<'_>| {
        ctx.spawn_flow(child, Value::from(10u64));
        ctx.spawn_flow(child, Value::from(30u64));
        Ok(Outcome::Complete)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("join", join_fn)
        .register_function("child", child_fn)
        .register_function("fork", fork_fn)
        .register_team("pool", Arc::new(WorkerTeam::new("pool", 4)))
        .build()
        .unwrap();
    office.start();

    let handle = office.instigate("fork", Value::Null, None).unwrap();
    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    assert_eq!(join_count.load(Ordering::SeqCst), 1);
    assert_eq!(office.metrics().snapshot().overlap_violations, 0);
    office.stop();
}

struct RecordingDuty {
    log: Log,
    label: String,
}

impl Duty for RecordingDuty {
    fn administer(&self, ctx: &mut dyn DutyContext) -> Result<DutyOutcome, Fault> {
        let counter_total: u32 = (0..ctx.extensions().len())
            .map(|i| ctx.extensions().with_extension::<u32, _>(i, |v| *v))
            .sum::<Result<u32, Fault>>()?;
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}:{}", self.label, ctx.phase(), counter_total));
        Ok(DutyOutcome::Done)
    }
}

struct CounterSource;

impl ObjectSource for CounterSource {
    fn source(&self, handle: SourcingHandle) -> Result<(), Fault> {
        handle.supply(Box::new(7u32));
        Ok(())
    }
}

#[test]
fn duties_run_strictly_around_the_body() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(0);
    let team = model.add_team(TeamModel::new("inline"));
    let counter = model.add_object(ObjectModel::new("counter"));
    let audit_pre = model.add_duty(DutyModel::new("audit_pre", DutyPhase::Pre).with_object(counter));
    let audit_post =
        model.add_duty(DutyModel::new("audit_post", DutyPhase::Post).with_object(counter));
    model.add_function(
        FunctionModel::new("work", team)
            .with_object(counter)
            .with_pre_duty(audit_pre)
            .with_post_duty(audit_post),
    );

    let log: Log = Arc::default();
    let log_body = Arc::clone(&log);
    let work = Arc::new(FnWork::new(move |ctx: &mut FunctionContext<'_>| {
        ctx.object::<u32, _>(0, |v| *v += 1)?;
        log_body.lock().unwrap().push("body".to_string());
        Ok(Outcome::Complete)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("work", work)
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .register_source("counter", Arc::new(CounterSource))
        .register_duty(
            "audit_pre",
            Arc::new(RecordingDuty {
                log: Arc::clone(&log),
                label: "pre".to_string(),
            }),
        )
        .register_duty(
            "audit_post",
            Arc::new(RecordingDuty {
                log: Arc::clone(&log),
                label: "post".to_string(),
            }),
        )
        .build()
        .unwrap();
    office.start();

    office
        .instigate("work", Value::Null, None)
        .unwrap()
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    // Pre sees the sourced value, post sees the body's increment
    assert_eq!(
        *log.lock().unwrap(),
        vec!["pre:pre:7", "body", "post:post:8"]
    );
    office.stop();
}

struct SuspendingDuty {
    slot: Arc<Mutex<Option<DutySuspension>>>,
    log: Log,
}

impl Duty for SuspendingDuty {
    fn administer(&self, ctx: &mut dyn DutyContext) -> Result<DutyOutcome, Fault> {
        self.log.lock().unwrap().push("duty".to_string());
        *self.slot.lock().unwrap() = Some(ctx.suspender());
        Ok(DutyOutcome::Suspended)
    }
}

#[test]
fn duty_suspends_and_resumes_before_the_body() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(0);
    let team = model.add_team(TeamModel::new("inline"));
    let gate = model.add_duty(DutyModel::new("gate", DutyPhase::Pre));
    model.add_function(FunctionModel::new("work", team).with_pre_duty(gate));

    let log: Log = Arc::default();
    let slot: Arc<Mutex<Option<DutySuspension>>> = Arc::default();

    let office = OfficeBuilder::new(model)
        .register_function("work", recorder(&log, "body"))
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .register_duty(
            "gate",
            Arc::new(SuspendingDuty {
                slot: Arc::clone(&slot),
                log: Arc::clone(&log),
            }),
        )
        .build()
        .unwrap();
    office.start();

    let handle = office.instigate("work", Value::Null, None).unwrap();
    assert_eq!(handle.poll(), ProcessStatus::Running);
    assert_eq!(*log.lock().unwrap(), vec!["duty"]);

    let suspension = slot.lock().unwrap().take().unwrap();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        suspension.resolve(Ok(()));
    });

    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["duty", "body"]);
    office.stop();
}

struct RecordingGovernance {
    log: Log,
}

impl Governance for RecordingGovernance {
    fn enact(
        &self,
        action: GovernanceAction,
        extensions: &ExtensionSet<'_>,
    ) -> Result<(), Fault> {
        let total: u32 = (0..extensions.len())
            .map(|i| extensions.with_extension::<u32, _>(i, |v| *v))
            .sum::<Result<u32, Fault>>()?;
        self.log
            .lock()
            .unwrap()
            .push(format!("enact:{action:?}:{total}"));
        Ok(())
    }
}

#[test]
fn governance_commit_enacts_over_registered_surfaces() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(0);
    let team = model.add_team(TeamModel::new("inline"));
    let audited = model.add_object(
        ObjectModel::new("audited").with_extension(ExtensionKind::from("audit")),
    );
    model.add_function(FunctionModel::new("work", team).with_object(audited));

    let log: Log = Arc::default();
    let work = Arc::new(FnWork::new(move |ctx: &mut FunctionContext<'_>| {
        ctx.activate_governance(ExtensionKind::from("audit"));
        ctx.object::<u32, _>(0, |v| *v += 10)?;
        ctx.commit_governance(ExtensionKind::from("audit"));
        Ok(Outcome::Complete)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("work", work)
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .register_source("audited", Arc::new(CounterSource))
        .register_governance(
            ExtensionKind::from("audit"),
            Arc::new(RecordingGovernance {
                log: Arc::clone(&log),
            }),
        )
        .build()
        .unwrap();
    office.start();

    office
        .instigate("work", Value::Null, None)
        .unwrap()
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["enact:Commit:17"]);
    office.stop();
}

#[test]
fn cancellation_reaches_the_asynchronous_caller() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(0);
    let team = model.add_team(TeamModel::new("inline"));
    model.add_function(FunctionModel::new("stuck", team));

    let stuck = Arc::new(FnWork::new(|ctx: &mut FunctionContext<'_>| {
        let _ = ctx.suspend("never", Some(0));
        Ok(Outcome::Suspend)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("stuck", stuck)
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .build()
        .unwrap();
    office.start();

    let reported: Arc<Mutex<Option<Result<(), Fault>>>> = Arc::default();
    let sink = Arc::clone(&reported);
    let handle = office
        .instigate(
            "stuck",
            Value::Null,
            Some(Box::new(move |result| {
                *sink.lock().unwrap() = Some(result);
            })),
        )
        .unwrap();

    assert_eq!(handle.poll(), ProcessStatus::Running);
    handle.cancel();

    let fault = handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap_err();
    assert_eq!(fault.kind, FaultKind::Cancelled);

    let callback_fault = reported.lock().unwrap().take().unwrap().unwrap_err();
    assert_eq!(callback_fault.kind, FaultKind::Cancelled);
    office.stop();
}

#[test]
fn sequential_discipline_holds_across_teams() {
    init_tracing();
    let mut model = OfficeModel::new("orders").with_tick_interval_ms(0);
    let alpha = model.add_team(TeamModel::new("alpha"));
    let beta = model.add_team(TeamModel::new("beta"));

    let tail = model.add_function(FunctionModel::new("tail", beta));
    let middle = model.add_function(FunctionModel::new("middle", alpha).with_next(tail));
    model.add_function(FunctionModel::new("head", beta).with_next(middle));

    let log: Log = Arc::default();
    let office = OfficeBuilder::new(model)
        .register_function("tail", recorder(&log, "tail"))
        .register_function("middle", recorder(&log, "middle"))
        .register_function("head", recorder(&log, "head"))
        .register_team("alpha", Arc::new(WorkerTeam::new("alpha", 2)))
        .register_team("beta", Arc::new(WorkerTeam::new("beta", 2)))
        .build()
        .unwrap();
    office.start();

    // Several concurrent processes, each a strictly ordered chain
    let handles: Vec<_> = (0..8)
        .map(|i| office.instigate("head", Value::from(i), None).unwrap())
        .collect();
    for handle in handles {
        handle
            .wait_timeout(WAIT)
            .expect("process did not complete")
            .unwrap();
    }

    let snapshot = office.metrics().snapshot();
    assert_eq!(snapshot.overlap_violations, 0);
    assert_eq!(snapshot.processes_resolved, 8);
    assert_eq!(snapshot.jobs_completed, 24);
    office.stop();
}
