//! ObjSync Core - Domain logic and boundary contracts
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncTarget`, `RecordSnapshot`, `OperationState`, `CycleSummary`
//! - **Sync descriptors** - per-entity remote mapping configuration with validation
//! - **Port definitions** - Traits for adapters: `ILocalStore`, `ITransport`, `IRemoteMapping`, `ISyncObserver`
//! - **Error taxonomy** - `SyncError` and the port-level error enums
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no external dependencies.
//! Ports define trait interfaces that adapter crates implement. The sync engine
//! (`objsync-engine`) orchestrates domain entities through port interfaces.

pub mod config;
pub mod descriptor;
pub mod domain;
pub mod errors;
pub mod ports;
