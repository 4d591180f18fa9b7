//! GANTRY Assets
//!
//! An asset is anything a job may need to wait on - a managed-object
//! load, a governance lock, an external executor. Asset managers own the
//! waiting sets and enforce the kernel's liveness guarantee: no job waits
//! past its configured timeout plus one tick.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod latch;
pub mod manager;
pub mod registry;

pub use latch::{Completer, CompletionLatch, LatchHandle, LatchPark};
pub use manager::{AssetError, AssetKey, AssetManager, AssetWaker, WakeReason};
pub use registry::{AssetRegistry, ManagerIndex};
