//! Sync descriptor registry
//!
//! Holds the per-entity [`SyncDescriptor`]s the engine is configured with.
//! Pure data plus lookup: registration, removal, ordered listing, and
//! immutable snapshots. All reads and writes are linearizable; a snapshot
//! reflects a registry state that existed at some point during the call,
//! never a torn mix of concurrent mutations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use objsync_core::descriptor::SyncDescriptor;
use objsync_core::domain::newtypes::EntityKind;
use objsync_core::errors::SyncError;

// ============================================================================
// SyncDescriptorRegistry
// ============================================================================

#[derive(Default)]
struct RegistryInner {
    /// Entity kinds in insertion order (re-registration moves to the end)
    order: Vec<EntityKind>,
    /// Descriptor lookup by entity kind
    by_entity: HashMap<EntityKind, Arc<SyncDescriptor>>,
}

/// Linearizable registry of sync descriptors
///
/// At most one descriptor is active per entity kind: registering a duplicate
/// atomically replaces the prior one, with no window where both or neither
/// is active.
#[derive(Default)]
pub struct SyncDescriptorRegistry {
    inner: RwLock<RegistryInner>,
}

impl SyncDescriptorRegistry {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor, replacing any prior one for the same entity
    ///
    /// # Errors
    ///
    /// `SyncError::InvalidDescriptor` if the descriptor fails validation;
    /// the registry is unchanged in that case.
    pub fn add(&self, descriptor: SyncDescriptor) -> Result<(), SyncError> {
        descriptor
            .validate()
            .map_err(|e| SyncError::InvalidDescriptor(e.to_string()))?;

        let mut inner = self.write_lock();
        Self::insert(&mut inner, descriptor);
        Ok(())
    }

    /// Registers a batch of descriptors atomically
    ///
    /// Either every descriptor is registered or none is: validation runs for
    /// the whole batch (including duplicate entities within the batch)
    /// before any insertion happens.
    pub fn add_all(&self, descriptors: Vec<SyncDescriptor>) -> Result<(), SyncError> {
        let mut seen: Vec<&EntityKind> = Vec::with_capacity(descriptors.len());
        for descriptor in &descriptors {
            descriptor
                .validate()
                .map_err(|e| SyncError::InvalidDescriptor(e.to_string()))?;
            if seen.contains(&descriptor.entity()) {
                return Err(SyncError::InvalidDescriptor(format!(
                    "entity '{}' appears more than once in the batch",
                    descriptor.entity()
                )));
            }
            seen.push(descriptor.entity());
        }

        let mut inner = self.write_lock();
        for descriptor in descriptors {
            Self::insert(&mut inner, descriptor);
        }
        Ok(())
    }

    /// Removes the descriptor for an entity kind
    ///
    /// Returns true if a descriptor was removed.
    pub fn remove(&self, entity: &EntityKind) -> bool {
        let mut inner = self.write_lock();
        if inner.by_entity.remove(entity).is_some() {
            inner.order.retain(|e| e != entity);
            debug!(entity = %entity, "Sync descriptor removed");
            true
        } else {
            false
        }
    }

    /// Returns the registered descriptors in insertion order
    pub fn list(&self) -> Vec<Arc<SyncDescriptor>> {
        let inner = self.read_lock();
        inner
            .order
            .iter()
            .filter_map(|entity| inner.by_entity.get(entity).cloned())
            .collect()
    }

    /// Returns the descriptor for an entity kind, if registered
    pub fn get(&self, entity: &EntityKind) -> Option<Arc<SyncDescriptor>> {
        self.read_lock().by_entity.get(entity).cloned()
    }

    /// Returns the number of registered descriptors
    pub fn len(&self) -> usize {
        self.read_lock().order.len()
    }

    /// Returns true when no descriptor is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes an immutable snapshot for the duration of one cycle
    ///
    /// The scanner and scheduler resolve descriptors against the same
    /// snapshot, so a cycle never observes a registry mutation mid-flight.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let inner = self.read_lock();
        RegistrySnapshot {
            ordered: inner
                .order
                .iter()
                .filter_map(|entity| inner.by_entity.get(entity).cloned())
                .collect(),
            by_entity: inner.by_entity.clone(),
        }
    }

    fn insert(inner: &mut RegistryInner, descriptor: SyncDescriptor) {
        let entity = descriptor.entity().clone();
        if inner.by_entity.contains_key(&entity) {
            inner.order.retain(|e| e != &entity);
            debug!(entity = %entity, "Replacing sync descriptor");
        } else {
            debug!(entity = %entity, rank = descriptor.rank().value(), "Sync descriptor added");
        }
        inner.order.push(entity.clone());
        inner.by_entity.insert(entity, Arc::new(descriptor));
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, RegistryInner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// RegistrySnapshot
// ============================================================================

/// Immutable view of the registry, taken once per cycle
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    ordered: Vec<Arc<SyncDescriptor>>,
    by_entity: HashMap<EntityKind, Arc<SyncDescriptor>>,
}

impl RegistrySnapshot {
    /// Returns the descriptor for an entity kind, if it was registered when
    /// the snapshot was taken
    pub fn get(&self, entity: &EntityKind) -> Option<&Arc<SyncDescriptor>> {
        self.by_entity.get(entity)
    }

    /// Returns the descriptors in insertion order
    pub fn descriptors(&self) -> &[Arc<SyncDescriptor>] {
        &self.ordered
    }

    /// Returns the number of descriptors in the snapshot
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    /// Returns true when the snapshot holds no descriptors
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
