//! ObjSync REST adapter
//!
//! Reference implementation of the `objsync-core` transport ports over
//! plain JSON-over-HTTP:
//!
//! - [`RestClient`] - typed HTTP client with bearer auth, base URL joining,
//!   and rate-limit-aware request submission
//! - [`HttpTransport`] - the `ITransport` implementation the engine talks to
//! - [`FieldMapping`] - declarative `IRemoteMapping` with attribute renames
//!   and relation keys

pub mod client;
pub mod mapping;
pub mod transport;

pub use client::RestClient;
pub use mapping::FieldMapping;
pub use transport::HttpTransport;
