//! Store write context - single-writer serialization.
//!
//! Provides [`StoreWriter`] to funnel every local store read and write the
//! engine performs through one dedicated task. The store's execution context
//! is the sole serialization point for record mutation: merges from
//! concurrently executing operations drain here sequentially, so no two
//! operations can corrupt each other's writes to overlapping records.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use objsync_core::domain::newtypes::LocalId;
use objsync_core::domain::record::{MergedFields, RecordSnapshot};
use objsync_core::ports::local_store::{ILocalStore, StoreError};

/// Queue depth of the write context channel
const WRITE_QUEUE_DEPTH: usize = 64;

// ============================================================================
// WriteOp enum
// ============================================================================

/// Store operations serialized through the write context
///
/// Each variant carries the data needed for the operation plus a oneshot
/// sender for returning the result to the caller.
#[derive(Debug)]
enum WriteOp {
    /// Read a point-in-time snapshot of a record
    Fetch {
        local_id: LocalId,
        reply: oneshot::Sender<Result<Option<RecordSnapshot>, StoreError>>,
    },

    /// Merge remote-confirmed fields into a record
    ApplyMerge {
        local_id: LocalId,
        fields: Box<MergedFields>,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },

    /// Clear a record's dirty flag
    MarkSynced {
        local_id: LocalId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },

    /// Remove a record (or its deletion tombstone) entirely
    Remove {
        local_id: LocalId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

// ============================================================================
// StoreWriter
// ============================================================================

/// Handle for marshalling store access onto the write context
///
/// The handle can be cloned and shared across operations; all commands are
/// processed sequentially by the owning task. Dropping every handle stops
/// the task.
#[derive(Clone)]
pub struct StoreWriter {
    tx: mpsc::Sender<WriteOp>,
}

impl StoreWriter {
    /// Spawns the write context task and returns its handle
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn(store: Arc<dyn ILocalStore>) -> Self {
        let (tx, mut rx) = mpsc::channel::<WriteOp>(WRITE_QUEUE_DEPTH);

        tokio::spawn(async move {
            debug!("Store write context started");
            while let Some(op) = rx.recv().await {
                match op {
                    WriteOp::Fetch { local_id, reply } => {
                        let result = store.fetch(&local_id).await;
                        let _ = reply.send(result);
                    }
                    WriteOp::ApplyMerge {
                        local_id,
                        fields,
                        reply,
                    } => {
                        let result = store.apply_merge(&local_id, &fields).await;
                        let _ = reply.send(result);
                    }
                    WriteOp::MarkSynced { local_id, reply } => {
                        let result = store.mark_synced(&local_id).await;
                        let _ = reply.send(result);
                    }
                    WriteOp::Remove { local_id, reply } => {
                        let result = store.remove(&local_id).await;
                        let _ = reply.send(result);
                    }
                }
            }
            debug!("Store write context stopped");
        });

        Self { tx }
    }

    /// Reads a record snapshot on the write context
    pub async fn fetch(&self, local_id: LocalId) -> Result<Option<RecordSnapshot>, StoreError> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteOp::Fetch {
            local_id,
            reply: tx,
        })
        .await?;
        rx.await.map_err(Self::reply_lost)?
    }

    /// Merges remote-confirmed fields into a record on the write context
    pub async fn apply_merge(
        &self,
        local_id: LocalId,
        fields: MergedFields,
    ) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteOp::ApplyMerge {
            local_id,
            fields: Box::new(fields),
            reply: tx,
        })
        .await?;
        rx.await.map_err(Self::reply_lost)?
    }

    /// Clears a record's dirty flag on the write context
    pub async fn mark_synced(&self, local_id: LocalId) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteOp::MarkSynced {
            local_id,
            reply: tx,
        })
        .await?;
        rx.await.map_err(Self::reply_lost)?
    }

    /// Removes a record on the write context
    pub async fn remove(&self, local_id: LocalId) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.submit(WriteOp::Remove {
            local_id,
            reply: tx,
        })
        .await?;
        rx.await.map_err(Self::reply_lost)?
    }

    async fn submit(&self, op: WriteOp) -> Result<(), StoreError> {
        self.tx
            .send(op)
            .await
            .map_err(|_| StoreError::Unavailable("store write context has stopped".to_string()))
    }

    fn reply_lost<E>(_: E) -> StoreError {
        StoreError::Unavailable("store write context dropped the reply".to_string())
    }
}
