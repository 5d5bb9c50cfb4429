//! Sync observer port (driving/primary port, outward)
//!
//! Embedders observe the engine through this interface; they never drive it.
//! The engine fires hooks synchronously from its own tasks and does not wait
//! on any observer result, so implementations must return quickly - hand off
//! to a channel or task for anything heavier than bookkeeping.

use crate::domain::cycle::{CycleId, CycleSummary};
use crate::domain::sync_target::SyncTarget;
use crate::errors::SyncError;

/// Port trait for engine lifecycle hooks
///
/// All methods have empty default bodies; implement only the hooks you need.
pub trait ISyncObserver: Send + Sync {
    /// A sync operation is about to execute its round trip
    fn will_sync(&self, _target: &SyncTarget) {}

    /// A sync operation completed and its result was applied locally
    fn did_sync(&self, _target: &SyncTarget) {}

    /// A sync operation failed or was cancelled; the record stays dirty
    fn did_fail_sync(&self, _target: &SyncTarget, _error: &SyncError) {}

    /// A cycle began (fired before the dirty scan)
    fn cycle_started(&self, _cycle: &CycleId) {}

    /// A cycle finished; the summary lists every failure with its cause
    fn cycle_completed(&self, _cycle: &CycleId, _summary: &CycleSummary) {}
}

/// Observer that ignores every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl ISyncObserver for NullObserver {}
