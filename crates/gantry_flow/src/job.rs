//! Work-function SPI and the per-invocation context.
//!
//! A function finishes by returning a tagged outcome - continue the
//! chain, continue at an explicit function, or suspend on an asset it
//! registered through the context. Failures are plain `Err` values; the
//! engine loop turns them into escalation, never the other way around.

use gantry_asset::LatchHandle;
use gantry_core::{Fault, FunctionIndex};
use gantry_govern::ExtensionKind;
use gantry_object::{ContainerError, ManagedObjectContainer};
use serde_json::Value;
use std::sync::Arc;

/// How a function body finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Follow the configured successor, if any
    Complete,
    /// Continue the same thread-state at an explicit function
    Next(FunctionIndex),
    /// Park until the suspension captured via
    /// [`FunctionContext::suspend`] resolves, then follow the configured
    /// successor
    Suspend,
}

/// One function invocation's logic
pub trait WorkFunction: Send + Sync {
    /// Execute the function body
    ///
    /// # Errors
    ///
    /// Returns a fault that aborts the remainder of the chain and enters
    /// escalation resolution on the same thread-state.
    fn execute(&self, ctx: &mut FunctionContext<'_>) -> Result<Outcome, Fault>;
}

/// Work function built from a closure
pub struct FnWork<F>(F);

impl<F> FnWork<F>
where
    F: Fn(&mut FunctionContext<'_>) -> Result<Outcome, Fault> + Send + Sync,
{
    /// Wrap a closure
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> WorkFunction for FnWork<F>
where
    F: Fn(&mut FunctionContext<'_>) -> Result<Outcome, Fault> + Send + Sync,
{
    fn execute(&self, ctx: &mut FunctionContext<'_>) -> Result<Outcome, Fault> {
        (self.0)(ctx)
    }
}

/// Request for a parallel child flow
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Entry function of the child thread-state
    pub function: FunctionIndex,
    /// Parameter handed to the entry function
    pub parameter: Value,
}

/// Buffered governance operation
#[derive(Debug, Clone)]
pub(crate) enum GovernanceOp {
    Activate(ExtensionKind),
    Commit(ExtensionKind),
    Disregard(ExtensionKind),
}

/// Suspension captured by a function body
pub(crate) struct SuspendRequest {
    pub(crate) label: String,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) latch: gantry_asset::CompletionLatch,
}

/// Everything a running function body can reach
///
/// Handed in by the engine; bodies never touch thread-state or process
/// bookkeeping directly.
pub struct FunctionContext<'a> {
    parameter: &'a Value,
    objects: &'a [(gantry_core::ObjectIndex, Arc<ManagedObjectContainer>)],
    pub(crate) spawns: Vec<SpawnRequest>,
    pub(crate) governance_ops: Vec<GovernanceOp>,
    pub(crate) suspension: Option<SuspendRequest>,
}

impl<'a> FunctionContext<'a> {
    pub(crate) fn new(
        parameter: &'a Value,
        objects: &'a [(gantry_core::ObjectIndex, Arc<ManagedObjectContainer>)],
    ) -> Self {
        Self {
            parameter,
            objects,
            spawns: Vec::new(),
            governance_ops: Vec::new(),
            suspension: None,
        }
    }

    /// Parameter bound to this invocation
    #[must_use]
    pub fn parameter(&self) -> &Value {
        self.parameter
    }

    /// Number of managed objects bound to this function
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Run a closure against a bound managed object
    ///
    /// `position` is the function's binding order, not the office-wide
    /// object index.
    ///
    /// # Errors
    ///
    /// Returns a fault when the object is unavailable or of another type.
    pub fn object<T: 'static, R>(
        &self,
        position: usize,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, Fault> {
        let (index, container) = self.objects.get(position).ok_or_else(|| {
            Fault::contract(format!("object position {position} out of range"))
        })?;
        container.with_object(f).map_err(|err| match err {
            ContainerError::WrongType { .. } | ContainerError::NotAvailable { .. } => Fault::new(
                gantry_core::FaultKind::SourcingFailed,
                format!("object {index}: {err}"),
            ),
            other => Fault::contract(format!("object {index}: {other}")),
        })
    }

    /// Fork a parallel child flow bound to this invocation's join counter
    ///
    /// The thread-state does not continue past this function until every
    /// spawned child completes.
    pub fn spawn_flow(&mut self, function: FunctionIndex, parameter: Value) {
        self.spawns.push(SpawnRequest {
            function,
            parameter,
        });
    }

    /// Activate governance over every currently bound object exposing
    /// the surface
    pub fn activate_governance(&mut self, kind: ExtensionKind) {
        self.governance_ops.push(GovernanceOp::Activate(kind));
    }

    /// Commit the innermost open governance scope for the surface
    pub fn commit_governance(&mut self, kind: ExtensionKind) {
        self.governance_ops.push(GovernanceOp::Commit(kind));
    }

    /// Disregard the innermost open governance scope for the surface
    pub fn disregard_governance(&mut self, kind: ExtensionKind) {
        self.governance_ops.push(GovernanceOp::Disregard(kind));
    }

    /// Register a suspension and get the resolver handle
    ///
    /// Return [`Outcome::Suspend`] afterwards; the thread-state parks and
    /// the team thread is released. External code resolves the handle
    /// from any thread, and the chain resumes through the asset-manager
    /// wake-up path on this function's own team.
    pub fn suspend(&mut self, label: impl Into<String>, timeout_ms: Option<u64>) -> LatchHandle {
        let request = self.suspension.get_or_insert_with(|| SuspendRequest {
            label: label.into(),
            timeout_ms,
            latch: gantry_asset::CompletionLatch::new(),
        });
        request.latch.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::ObjectIndex;
    use gantry_object::SourcePolicy;

    fn ready_container(value: u32) -> Arc<ManagedObjectContainer> {
        let container = ManagedObjectContainer::new("m", SourcePolicy::OneShot, None);
        container.begin_sourcing().unwrap();
        container.sourcing_handle().supply(Box::new(value));
        Arc::new(container)
    }

    #[test]
    fn test_context_object_access() {
        let parameter = Value::from(1);
        let objects = vec![(ObjectIndex::new(0), ready_container(10))];
        let ctx = FunctionContext::new(&parameter, &objects);

        assert_eq!(ctx.object_count(), 1);
        let doubled = ctx.object::<u32, _>(0, |v| *v * 2).unwrap();
        assert_eq!(doubled, 20);

        let err = ctx.object::<u32, _>(5, |v| *v).unwrap_err();
        assert_eq!(err.kind, gantry_core::FaultKind::Contract);
    }

    #[test]
    fn test_context_records_spawns() {
        let parameter = Value::Null;
        let objects = Vec::new();
        let mut ctx = FunctionContext::new(&parameter, &objects);

        ctx.spawn_flow(FunctionIndex::new(3), Value::from("child"));
        ctx.spawn_flow(FunctionIndex::new(4), Value::Null);
        assert_eq!(ctx.spawns.len(), 2);
        assert_eq!(ctx.spawns[0].function, FunctionIndex::new(3));
    }

    #[test]
    fn test_context_single_suspension() {
        let parameter = Value::Null;
        let objects = Vec::new();
        let mut ctx = FunctionContext::new(&parameter, &objects);

        let first = ctx.suspend("io", Some(100));
        let second = ctx.suspend("ignored", None);

        // Both handles resolve the same latch; only the first wins
        assert!(first.resolve(Ok(())));
        assert!(!second.resolve(Ok(())));
    }

    #[test]
    fn test_fn_work() {
        let function = FnWork::new(|ctx: &mut FunctionContext<'_>| {
            if ctx.parameter().is_null() {
                return Err(Fault::user("NULL", "no parameter"));
            }
            Ok(Outcome::Complete)
        });

        let parameter = Value::from(1);
        let objects = Vec::new();
        let mut ctx = FunctionContext::new(&parameter, &objects);
        assert_eq!(function.execute(&mut ctx).unwrap(), Outcome::Complete);

        let parameter = Value::Null;
        let mut ctx = FunctionContext::new(&parameter, &objects);
        assert!(function.execute(&mut ctx).is_err());
    }
}
