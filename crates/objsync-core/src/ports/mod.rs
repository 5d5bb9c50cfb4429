//! Port definitions (hexagonal architecture)
//!
//! Ports are the trait interfaces through which the sync engine talks to its
//! collaborators. Adapter crates implement them:
//! - [`ILocalStore`] - the local object store (change feed, snapshots, merges)
//! - [`ITransport`] - the wire-level request/response exchange
//! - [`IRemoteMapping`] - opaque local/remote field translation
//! - [`ISyncObserver`] - outward lifecycle hooks for embedders

pub mod local_store;
pub mod mapping;
pub mod observer;
pub mod transport;

pub use local_store::{ChangeKind, ChangedRecord, ILocalStore, StoreError};
pub use mapping::{IRemoteMapping, MappingError, ResolvedRelations};
pub use observer::{ISyncObserver, NullObserver};
pub use transport::{HttpMethod, ITransport, SyncRequest, SyncResponse, TransportError};
