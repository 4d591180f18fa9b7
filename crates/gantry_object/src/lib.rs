//! GANTRY Managed Objects
//!
//! Lifecycle containers for externally sourced resources: the
//! `UNSOURCED -> SOURCING -> READY -> IN_USE -> RECYCLING -> RECYCLED`
//! state machine, the sourcing SPI with synchronous and asynchronous
//! completion, and pooling.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod container;
pub mod pool;
pub mod source;

pub use container::{
    BindScope, ContainerError, ContainerState, ManagedObjectContainer, ObjectPayload,
    ParkOutcome, SourceBegin, SourcePolicy, SourcingHandle, SupplyOutcome,
};
pub use gantry_asset::Completer;
pub use pool::{ObjectPool, VecPool};
pub use source::{FnSource, ObjectSource};
