//! ObjSync Engine - two-way object synchronization
//!
//! This crate orchestrates synchronization between a local object store and
//! a remote HTTP resource store, both consumed through the ports defined in
//! `objsync-core`:
//!
//! - [`SyncDescriptorRegistry`] - per-entity sync configuration, linearizable
//! - [`DirtyScanner`] - turns the store's change feed into classified targets
//! - [`StoreWriter`] - single-writer funnel for all local store access
//! - [`SyncOperation`] - one record's create/update/delete round trip
//! - [`SyncScheduler`] - rank-ordered, dependency-respecting execution
//! - [`SyncEngine`] - the facade that runs full cycles
//!
//! ## Cycle Flow
//!
//! ```text
//! ILocalStore ──► DirtyScanner ──► SyncTargets ──► SyncScheduler
//!                      │                               │
//!              SyncDescriptorRegistry          SyncOperation × N
//!                                                      │
//!                                          ITransport / StoreWriter
//! ```

pub mod engine;
pub mod observer;
pub mod operation;
pub mod registry;
pub mod scanner;
pub mod scheduler;
pub mod write_context;

#[cfg(test)]
pub(crate) mod testutil;

pub use engine::SyncEngine;
pub use observer::LogObserver;
pub use operation::{OperationOutcome, SyncOperation};
pub use registry::{RegistrySnapshot, SyncDescriptorRegistry};
pub use scanner::DirtyScanner;
pub use scheduler::SyncScheduler;
pub use write_context::StoreWriter;
