//! Liveness guarantees: the office tick bounds every registered wait.

use gantry_flow::{FnWork, FunctionContext, Outcome};
use gantry_model::{
    EscalationTable, FaultMatch, FunctionModel, KindPattern, OfficeModel, TeamModel,
};
use gantry_office::{OfficeBuilder, ProcessStatus};
use gantry_team::PassiveTeam;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[test]
fn timeout_fires_within_one_tick_of_the_deadline() {
    init_tracing();
    // Asset timeout 100ms, tick interval 50ms: escalation must fire no
    // earlier than the timeout and no later than one tick after it
    // (plus scheduling slack)
    let mut model = OfficeModel::new("liveness")
        .with_tick_interval_ms(50)
        .with_default_asset_timeout_ms(100);
    let team = model.add_team(TeamModel::new("inline"));
    let handler = model.add_function(FunctionModel::new("on_timeout", team));
    model.add_function(FunctionModel::new("waiting", team));
    model.escalations =
        EscalationTable::new().with_entry(FaultMatch::Kind(KindPattern::Timeout), handler);

    let fired_at: Arc<Mutex<Option<Instant>>> = Arc::default();
    let sink = Arc::clone(&fired_at);
    let on_timeout = Arc::new(FnWork::new(move |_ctx: &mut FunctionContext<'_>| {
        *sink.lock().unwrap() = Some(Instant::now());
        Ok(Outcome::Complete)
    }));

    let waiting = Arc::new(FnWork::new(|ctx: &mut FunctionContext<'_>| {
        // The handle is dropped: only the timeout sweep can wake this
        let _ = ctx.suspend("abandoned", None);
        Ok(Outcome::Suspend)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("on_timeout", on_timeout)
        .register_function("waiting", waiting)
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .build()
        .unwrap();
    office.start();

    let started = Instant::now();
    let handle = office.instigate("waiting", Value::Null, None).unwrap();
    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    let fired = fired_at.lock().unwrap().expect("handler never ran");
    let elapsed = fired.duration_since(started);
    assert!(
        elapsed >= Duration::from_millis(100),
        "fired too early: {elapsed:?}"
    );
    // One tick past the deadline, with generous scheduling slack
    assert!(
        elapsed < Duration::from_millis(1_000),
        "fired too late: {elapsed:?}"
    );
    assert_eq!(office.metrics().snapshot().timeouts, 1);
    office.stop();
}

#[test]
fn zero_tick_interval_disables_monitoring() {
    init_tracing();
    let mut model = OfficeModel::new("liveness")
        .with_tick_interval_ms(0)
        .with_default_asset_timeout_ms(50);
    let team = model.add_team(TeamModel::new("inline"));
    model.add_function(FunctionModel::new("waiting", team));

    let slot: Arc<Mutex<Option<gantry_govern::DutySuspension>>> = Arc::default();
    let stash = Arc::clone(&slot);
    let waiting = Arc::new(FnWork::new(move |ctx: &mut FunctionContext<'_>| {
        *stash.lock().unwrap() = Some(ctx.suspend("patient", None));
        Ok(Outcome::Suspend)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("waiting", waiting)
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .build()
        .unwrap();
    office.start();

    let handle = office.instigate("waiting", Value::Null, None).unwrap();

    // Well past the nominal timeout, nothing fires without a tick
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(handle.poll(), ProcessStatus::Running);
    assert_eq!(office.metrics().snapshot().timeouts, 0);

    // Synchronous completion still works
    let suspension = slot.lock().unwrap().take().unwrap();
    suspension.resolve(Ok(()));
    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();
    office.stop();
}

#[test]
fn each_asset_escalates_exactly_once() {
    init_tracing();
    let mut model = OfficeModel::new("liveness")
        .with_tick_interval_ms(20)
        .with_default_asset_timeout_ms(40);
    let team = model.add_team(TeamModel::new("inline"));
    let handler = model.add_function(FunctionModel::new("on_timeout", team));
    model.add_function(FunctionModel::new("waiting", team));
    model.escalations =
        EscalationTable::new().with_entry(FaultMatch::Kind(KindPattern::Timeout), handler);

    let handled = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&handled);
    let on_timeout = Arc::new(FnWork::new(move |_ctx: &mut FunctionContext<'_>| {
        *counter.lock().unwrap() += 1;
        Ok(Outcome::Complete)
    }));
    let waiting = Arc::new(FnWork::new(|ctx: &mut FunctionContext<'_>| {
        let _ = ctx.suspend("abandoned", None);
        Ok(Outcome::Suspend)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("on_timeout", on_timeout)
        .register_function("waiting", waiting)
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .build()
        .unwrap();
    office.start();

    let handle = office.instigate("waiting", Value::Null, None).unwrap();
    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    // Several further ticks elapse; the asset must not fire again
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(*handled.lock().unwrap(), 1);
    assert_eq!(office.metrics().snapshot().timeouts, 1);
    office.stop();
}

#[test]
fn late_resolution_after_timeout_is_dropped() {
    init_tracing();
    let mut model = OfficeModel::new("liveness")
        .with_tick_interval_ms(20)
        .with_default_asset_timeout_ms(40);
    let team = model.add_team(TeamModel::new("inline"));
    let handler = model.add_function(FunctionModel::new("on_timeout", team));
    model.add_function(FunctionModel::new("waiting", team));
    model.escalations =
        EscalationTable::new().with_entry(FaultMatch::Kind(KindPattern::Timeout), handler);

    let slot: Arc<Mutex<Option<gantry_govern::DutySuspension>>> = Arc::default();
    let stash = Arc::clone(&slot);
    let waiting = Arc::new(FnWork::new(move |ctx: &mut FunctionContext<'_>| {
        *stash.lock().unwrap() = Some(ctx.suspend("slow", None));
        Ok(Outcome::Suspend)
    }));
    let on_timeout = Arc::new(FnWork::new(|_ctx: &mut FunctionContext<'_>| {
        Ok(Outcome::Complete)
    }));

    let office = OfficeBuilder::new(model)
        .register_function("on_timeout", on_timeout)
        .register_function("waiting", waiting)
        .register_team("inline", Arc::new(PassiveTeam::new("inline")))
        .build()
        .unwrap();
    office.start();

    let handle = office.instigate("waiting", Value::Null, None).unwrap();
    handle
        .wait_timeout(WAIT)
        .expect("process did not complete")
        .unwrap();

    // The external completion arrives after the timeout already fired;
    // the asset manager drops it instead of waking anything twice
    let suspension = slot.lock().unwrap().take().unwrap();
    let _ = suspension.resolve(Ok(()));
    std::thread::sleep(Duration::from_millis(50));

    let snapshot = office.metrics().snapshot();
    assert_eq!(snapshot.timeouts, 1);
    assert_eq!(snapshot.processes_resolved, 1);
    office.stop();
}
