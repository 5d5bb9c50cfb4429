//! Engine facade - full synchronization cycles
//!
//! [`SyncEngine`] owns the descriptor registry, the port handles, the
//! observer list, and the dirty watermark. One call to [`SyncEngine::sync`]
//! runs a complete cycle:
//!
//! 1. Snapshot the registry (scanner and scheduler share one view)
//! 2. Fire `cycle_started`
//! 3. Scan the store's change feed into classified targets
//! 4. Execute the targets rank bucket by rank bucket
//! 5. Fire `cycle_completed` with the summary and advance the watermark
//!
//! Per-object failures never abort a cycle. Only a store that cannot even
//! produce its change feed aborts the cycle before it starts, as an error
//! from `sync()` itself.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use objsync_core::config::Config;
use objsync_core::descriptor::SyncDescriptor;
use objsync_core::domain::cycle::{CycleId, CycleSummary};
use objsync_core::errors::SyncError;
use objsync_core::ports::local_store::ILocalStore;
use objsync_core::ports::observer::ISyncObserver;
use objsync_core::ports::transport::ITransport;

use crate::registry::SyncDescriptorRegistry;
use crate::scanner::DirtyScanner;
use crate::scheduler::SyncScheduler;
use crate::write_context::StoreWriter;

/// Two-way object synchronization engine
///
/// ## Dependencies
///
/// - `store`: local object store (change feed, snapshots, merges)
/// - `transport`: wire-level request execution
/// - `config`: concurrency ceiling and remote settings
pub struct SyncEngine {
    registry: SyncDescriptorRegistry,
    scanner: DirtyScanner,
    transport: Arc<dyn ITransport>,
    writer: StoreWriter,
    observers: Vec<Arc<dyn ISyncObserver>>,
    max_concurrent: usize,
    /// Start time of the last cycle whose scan ran; lower bound for the
    /// next change feed read
    watermark: Mutex<Option<DateTime<Utc>>>,
    /// Cancellation token of the in-flight cycle, if any
    current_cycle: Mutex<Option<CancellationToken>>,
}

impl SyncEngine {
    /// Creates an engine over the given collaborators
    ///
    /// Spawns the store write context; must be called within a Tokio
    /// runtime.
    pub fn new(
        store: Arc<dyn ILocalStore>,
        transport: Arc<dyn ITransport>,
        config: &Config,
    ) -> Self {
        let writer = StoreWriter::spawn(Arc::clone(&store));
        Self {
            registry: SyncDescriptorRegistry::new(),
            scanner: DirtyScanner::new(store),
            transport,
            writer,
            observers: Vec::new(),
            max_concurrent: config.engine.max_concurrent as usize,
            watermark: Mutex::new(None),
            current_cycle: Mutex::new(None),
        }
    }

    /// Returns the descriptor registry for configuration
    pub fn registry(&self) -> &SyncDescriptorRegistry {
        &self.registry
    }

    /// Registers a descriptor, replacing any prior one for its entity
    pub fn add_descriptor(&self, descriptor: SyncDescriptor) -> Result<(), SyncError> {
        self.registry.add(descriptor)
    }

    /// Registers a batch of descriptors atomically
    pub fn add_descriptors(&self, descriptors: Vec<SyncDescriptor>) -> Result<(), SyncError> {
        self.registry.add_all(descriptors)
    }

    /// Adds a lifecycle observer
    ///
    /// Observers are notified synchronously from engine tasks and must
    /// return quickly.
    pub fn add_observer(&mut self, observer: Arc<dyn ISyncObserver>) {
        self.observers.push(observer);
    }

    /// Runs one full synchronization cycle
    ///
    /// # Returns
    /// The [`CycleSummary`] with per-operation outcome counts and the list
    /// of failures with their causes.
    ///
    /// # Errors
    /// Only when the cycle could not start at all (the store could not
    /// produce its change feed). Per-object failures are reported in the
    /// summary, never as an error.
    #[tracing::instrument(skip(self))]
    pub async fn sync(&self) -> Result<CycleSummary, SyncError> {
        let cycle_id = CycleId::new();
        let snapshot = self.registry.snapshot();
        let cancel = CancellationToken::new();
        self.set_current_cycle(Some(cancel.clone()));

        info!(
            cycle = %cycle_id,
            descriptors = snapshot.len(),
            "Starting sync cycle"
        );
        for observer in &self.observers {
            observer.cycle_started(&cycle_id);
        }

        let since = *self.lock_watermark();
        let scan_started_at = Utc::now();

        let targets = match self.scanner.scan(&snapshot, since).await {
            Ok(targets) => targets,
            Err(err) => {
                error!(cycle = %cycle_id, error = %err, "Cycle could not start");
                self.set_current_cycle(None);
                return Err(err);
            }
        };

        info!(cycle = %cycle_id, targets = targets.len(), "Dirty scan complete");

        let scheduler = SyncScheduler::new(
            Arc::clone(&self.transport),
            self.writer.clone(),
            Arc::new(self.observers.clone()),
            self.max_concurrent,
        );
        let summary = scheduler.run_cycle(targets, &snapshot, &cancel).await;

        // Records whose sync failed stay dirty and reappear regardless of
        // the watermark; the watermark only spares stores a full journal
        // walk. A cancelled cycle keeps the old watermark so nothing edited
        // mid-cycle is skipped.
        if !cancel.is_cancelled() {
            *self.lock_watermark() = Some(scan_started_at);
        }
        self.set_current_cycle(None);

        info!(
            cycle = %cycle_id,
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "Sync cycle completed"
        );
        for observer in &self.observers {
            observer.cycle_completed(&cycle_id, &summary);
        }

        Ok(summary)
    }

    /// Cancels the in-flight cycle, if any
    ///
    /// Pending operations are never submitted; executing operations end
    /// `Cancelled` and skip merging.
    pub fn cancel(&self) {
        let guard = self
            .current_cycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(token) = guard.as_ref() {
            info!("Cancelling in-flight sync cycle");
            token.cancel();
        }
    }

    fn set_current_cycle(&self, token: Option<CancellationToken>) {
        *self
            .current_cycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    fn lock_watermark(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.watermark
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
