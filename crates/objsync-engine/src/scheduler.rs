//! Sync scheduler - rank-ordered, dependency-respecting execution
//!
//! The scheduler accepts the full batch of [`SyncTarget`]s for a cycle and
//! executes them with the following ordering guarantees:
//!
//! 1. Targets are partitioned into rank buckets, ascending. A bucket begins
//!    only after the previous bucket fully drained (every operation in it
//!    reached a terminal state).
//! 2. Within a bucket, operations with no dependency on another cycle
//!    member run concurrently up to the configured ceiling. An operation
//!    whose target references another not-yet-synced cycle member is held
//!    until that member's operation completes.
//! 3. A failed operation does not block its bucket from draining; it simply
//!    never unblocks dependents, which fail with `DependencyUnsatisfiable`
//!    without any network I/O. The same applies across buckets.
//! 4. The scheduler reports a [`CycleSummary`] at cycle end; per-object
//!    failures never abort the cycle.
//!
//! Dependencies among targets of the same bucket are executed in waves:
//! each round runs every target whose prerequisites are terminal, then
//! re-classifies. A round that can start nothing while targets still wait
//! means the remaining targets form a dependency cycle (or wait on a
//! later-ranked member); they fail closed rather than deadlock.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use objsync_core::domain::cycle::{CycleFailure, CycleSummary};
use objsync_core::domain::newtypes::{LocalId, SyncRank};
use objsync_core::domain::operation::OperationState;
use objsync_core::domain::sync_target::SyncTarget;
use objsync_core::errors::SyncError;
use objsync_core::ports::observer::ISyncObserver;
use objsync_core::ports::transport::ITransport;

use crate::operation::{OperationOutcome, SyncOperation};
use crate::registry::RegistrySnapshot;
use crate::write_context::StoreWriter;

/// Executes one cycle's sync operations
pub struct SyncScheduler {
    transport: Arc<dyn ITransport>,
    writer: StoreWriter,
    observers: Arc<Vec<Arc<dyn ISyncObserver>>>,
    max_concurrent: usize,
}

impl SyncScheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    /// * `transport` - Wire-level collaborator shared by all operations
    /// * `writer` - Store write context handle
    /// * `observers` - Lifecycle hooks to notify per operation
    /// * `max_concurrent` - Concurrency ceiling for executing operations
    pub fn new(
        transport: Arc<dyn ITransport>,
        writer: StoreWriter,
        observers: Arc<Vec<Arc<dyn ISyncObserver>>>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            transport,
            writer,
            observers,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Runs the full batch of targets to terminal states
    #[tracing::instrument(skip_all, fields(targets = targets.len()))]
    pub async fn run_cycle(
        &self,
        targets: Vec<SyncTarget>,
        registry: &RegistrySnapshot,
        cancel: &CancellationToken,
    ) -> CycleSummary {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        // Dependencies only bind when the referenced record is itself a
        // member of this cycle; clean records already have their identity.
        let members: HashSet<LocalId> = targets.iter().map(|t| *t.local_id()).collect();
        let mut completed: HashSet<LocalId> = HashSet::new();
        let mut doomed: HashSet<LocalId> = HashSet::new();

        let mut buckets: BTreeMap<SyncRank, Vec<SyncTarget>> = BTreeMap::new();
        for target in targets {
            buckets.entry(target.rank()).or_default().push(target);
        }

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        for (rank, bucket) in buckets {
            debug!(
                rank = rank.value(),
                operations = bucket.len(),
                "Draining rank bucket"
            );
            self.drain_bucket(
                bucket,
                registry,
                &members,
                &mut completed,
                &mut doomed,
                &semaphore,
                cancel,
                &mut summary,
            )
            .await;
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            completed = summary.completed,
            failed = summary.failed,
            cancelled = summary.cancelled,
            duration_ms = summary.duration_ms,
            "Cycle drained"
        );
        summary
    }

    /// Drains one rank bucket to terminal states
    #[allow(clippy::too_many_arguments)]
    async fn drain_bucket(
        &self,
        bucket: Vec<SyncTarget>,
        registry: &RegistrySnapshot,
        members: &HashSet<LocalId>,
        completed: &mut HashSet<LocalId>,
        doomed: &mut HashSet<LocalId>,
        semaphore: &Arc<Semaphore>,
        cancel: &CancellationToken,
        summary: &mut CycleSummary,
    ) {
        let mut pending = bucket;

        while !pending.is_empty() {
            if cancel.is_cancelled() {
                for target in pending.drain(..) {
                    self.record_outcome(OperationOutcome::never_started(target), completed, doomed, summary);
                }
                return;
            }

            // Classify: ready to run, doomed by a failed prerequisite, or
            // still waiting on an executing/unstarted member.
            let mut ready = Vec::new();
            let mut waiting = Vec::new();
            for target in pending.drain(..) {
                let failed_dep = target
                    .depends_on()
                    .iter()
                    .copied()
                    .find(|dep| doomed.contains(dep));
                if let Some(dep) = failed_dep {
                    self.record_dependency_failure(target, dep, doomed, summary);
                    continue;
                }
                let blocked = target
                    .depends_on()
                    .iter()
                    .any(|dep| members.contains(dep) && !completed.contains(dep));
                if blocked {
                    waiting.push(target);
                } else {
                    ready.push(target);
                }
            }

            if ready.is_empty() {
                // Nothing can start and nothing is executing: the remaining
                // targets wait on each other or on a later-ranked member.
                for target in waiting {
                    let dep = target
                        .depends_on()
                        .iter()
                        .copied()
                        .find(|dep| members.contains(dep) && !completed.contains(dep))
                        .unwrap_or(*target.local_id());
                    self.record_dependency_failure(target, dep, doomed, summary);
                }
                return;
            }

            // Execute the ready wave concurrently under the ceiling.
            let mut join_set: JoinSet<OperationOutcome> = JoinSet::new();
            for target in ready {
                let Some(descriptor) = registry.get(target.entity()).cloned() else {
                    // Cannot happen while scanner and scheduler share one
                    // snapshot, but fail closed rather than panic.
                    let error = SyncError::InvalidDescriptor(format!(
                        "no descriptor for entity '{}' in cycle snapshot",
                        target.entity()
                    ));
                    self.record_failure(target, error, doomed, summary);
                    continue;
                };

                let semaphore = Arc::clone(semaphore);
                let transport = Arc::clone(&self.transport);
                let writer = self.writer.clone();
                let observers = Arc::clone(&self.observers);
                let op_cancel = cancel.child_token();

                join_set.spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return OperationOutcome::never_started(target),
                    };
                    if op_cancel.is_cancelled() {
                        return OperationOutcome::never_started(target);
                    }
                    for observer in observers.iter() {
                        observer.will_sync(&target);
                    }
                    SyncOperation::new(target, descriptor, transport, writer, op_cancel)
                        .execute()
                        .await
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(outcome) => self.record_outcome(outcome, completed, doomed, summary),
                    Err(join_error) => {
                        // A panicked operation cannot be attributed to a
                        // target anymore; surface it loudly.
                        error!(error = %join_error, "Sync operation task aborted");
                    }
                }
            }

            pending = waiting;
        }
    }

    fn record_outcome(
        &self,
        outcome: OperationOutcome,
        completed: &mut HashSet<LocalId>,
        doomed: &mut HashSet<LocalId>,
        summary: &mut CycleSummary,
    ) {
        match outcome.state {
            OperationState::Completed => {
                completed.insert(*outcome.target.local_id());
                summary.completed += 1;
                for observer in self.observers.iter() {
                    observer.did_sync(&outcome.target);
                }
            }
            OperationState::Cancelled => {
                doomed.insert(*outcome.target.local_id());
                summary.cancelled += 1;
                let error = outcome.error.unwrap_or(SyncError::Cancelled);
                self.notify_failure(&outcome.target, error, summary);
            }
            OperationState::Failed => {
                doomed.insert(*outcome.target.local_id());
                summary.failed += 1;
                let error = outcome
                    .error
                    .unwrap_or_else(|| SyncError::Store("operation failed without a cause".into()));
                self.notify_failure(&outcome.target, error, summary);
            }
            state => {
                // Operations always return terminal states; anything else is
                // an engine bug worth hearing about in logs.
                error!(state = %state, local_id = %outcome.target.local_id(), "Operation ended in a non-terminal state");
            }
        }
    }

    fn record_failure(
        &self,
        target: SyncTarget,
        error: SyncError,
        doomed: &mut HashSet<LocalId>,
        summary: &mut CycleSummary,
    ) {
        doomed.insert(*target.local_id());
        summary.failed += 1;
        self.notify_failure(&target, error, summary);
    }

    fn record_dependency_failure(
        &self,
        target: SyncTarget,
        dependency: LocalId,
        doomed: &mut HashSet<LocalId>,
        summary: &mut CycleSummary,
    ) {
        debug!(
            local_id = %target.local_id(),
            dependency = %dependency,
            "Prerequisite unsatisfiable, failing dependent without network I/O"
        );
        let error = SyncError::DependencyUnsatisfiable {
            dependent: *target.local_id(),
            dependency,
        };
        self.record_failure(target, error, doomed, summary);
    }

    fn notify_failure(&self, target: &SyncTarget, error: SyncError, summary: &mut CycleSummary) {
        for observer in self.observers.iter() {
            observer.did_fail_sync(target, &error);
        }
        summary.failures.push(CycleFailure {
            entity: target.entity().clone(),
            local_id: *target.local_id(),
            action: target.action(),
            error,
        });
    }
}
