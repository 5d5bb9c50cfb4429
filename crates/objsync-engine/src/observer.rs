//! Tracing-backed sync observer
//!
//! [`LogObserver`] turns engine lifecycle hooks into structured log events,
//! so embedders get per-object and per-cycle sync logs without wiring up an
//! observer of their own.

use tracing::{debug, info, warn};

use objsync_core::domain::cycle::{CycleId, CycleSummary};
use objsync_core::domain::sync_target::SyncTarget;
use objsync_core::errors::SyncError;
use objsync_core::ports::observer::ISyncObserver;

/// Observer that logs every lifecycle event through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl ISyncObserver for LogObserver {
    fn will_sync(&self, target: &SyncTarget) {
        debug!(
            entity = %target.entity(),
            local_id = %target.local_id(),
            action = %target.action(),
            rank = target.rank().value(),
            "Sync operation starting"
        );
    }

    fn did_sync(&self, target: &SyncTarget) {
        info!(
            entity = %target.entity(),
            local_id = %target.local_id(),
            action = %target.action(),
            "Sync operation completed"
        );
    }

    fn did_fail_sync(&self, target: &SyncTarget, error: &SyncError) {
        warn!(
            entity = %target.entity(),
            local_id = %target.local_id(),
            action = %target.action(),
            error = %error,
            "Sync operation did not complete"
        );
    }

    fn cycle_started(&self, cycle: &CycleId) {
        info!(cycle = %cycle, "Sync cycle started");
    }

    fn cycle_completed(&self, cycle: &CycleId, summary: &CycleSummary) {
        info!(
            cycle = %cycle,
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "Sync cycle completed"
        );
    }
}
