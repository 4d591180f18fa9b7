//! Sourcing SPI for externally provided objects.

use crate::container::SourcingHandle;
use crate::pool::ObjectPool;
use gantry_core::Fault;
use std::sync::Arc;

/// Provider of managed objects for one binding
///
/// `source` either supplies through the handle before returning
/// (synchronous completion) or stashes a clone of the handle and supplies
/// later from any thread (asynchronous completion). Returning an error
/// fails the sourcing immediately.
pub trait ObjectSource: Send + Sync {
    /// Begin sourcing one object
    ///
    /// # Errors
    ///
    /// Returns a fault when the object cannot be sourced; the container
    /// moves to `FAILED` and the fault escalates in the requesting scope.
    fn source(&self, handle: SourcingHandle) -> Result<(), Fault>;

    /// Pool for reusable instances, if this source pools
    fn pool(&self) -> Option<Arc<dyn ObjectPool>> {
        None
    }
}

/// Source wrapping a closure that builds objects synchronously
pub struct FnSource<F> {
    build: F,
}

impl<F> FnSource<F>
where
    F: Fn() -> Result<crate::container::ObjectPayload, Fault> + Send + Sync,
{
    /// Wrap a builder closure
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

impl<F> ObjectSource for FnSource<F>
where
    F: Fn() -> Result<crate::container::ObjectPayload, Fault> + Send + Sync,
{
    fn source(&self, handle: SourcingHandle) -> Result<(), Fault> {
        let object = (self.build)()?;
        handle.supply(object);
        Ok(())
    }
}
