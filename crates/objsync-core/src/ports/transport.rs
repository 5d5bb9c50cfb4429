//! Transport port (driven/secondary port)
//!
//! This module defines the wire-level collaborator interface. The engine
//! builds a [`SyncRequest`] (method, address, JSON payload) from the
//! resolved mapping; everything below that - connection handling, header
//! management, serialization internals, timeouts - belongs to the adapter.
//!
//! ## Design Notes
//!
//! - The engine performs exactly one attempt per operation per cycle.
//!   Retry-with-backoff policies, pagination, and auth token refresh are
//!   adapter concerns; the adapter reports plain success or failure.
//! - [`TransportError`] classes exist so the engine can report failures
//!   precisely, not so it can branch on them: every transport failure
//!   leaves the record dirty for the next cycle.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// TransportError
// ============================================================================

/// Errors reported by the transport collaborator
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within the adapter's timeout
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The remote answered with a non-success status
    #[error("Remote returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body excerpt or status text
        message: String,
    },

    /// The response body could not be decoded
    #[error("Response decoding failed: {0}")]
    Decode(String),
}

// ============================================================================
// Request / response DTOs
// ============================================================================

/// HTTP semantic of a sync request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// Create a resource in a collection
    Post,
    /// Replace a resource
    Put,
    /// Partially update a resource
    Patch,
    /// Remove a resource
    Delete,
}

impl HttpMethod {
    /// Returns the method name in wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request the engine asks the transport to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the adapter's base URL (e.g. `/tasks/42`)
    pub path: String,
    /// JSON payload, absent for deletes
    pub payload: Option<Value>,
}

impl SyncRequest {
    /// Creates a POST request against a collection path
    pub fn post(path: impl Into<String>, payload: Value) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            payload: Some(payload),
        }
    }

    /// Creates a PUT request against a resource path
    pub fn put(path: impl Into<String>, payload: Value) -> Self {
        Self {
            method: HttpMethod::Put,
            path: path.into(),
            payload: Some(payload),
        }
    }

    /// Creates a DELETE request against a resource path
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            payload: None,
        }
    }
}

/// A successful transport exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResponse {
    /// HTTP status code (2xx)
    pub status: u16,
    /// Decoded JSON body, absent for empty responses (e.g. 204)
    pub body: Option<Value>,
}

// ============================================================================
// ITransport trait
// ============================================================================

/// Port trait for the wire-level collaborator
#[async_trait::async_trait]
pub trait ITransport: Send + Sync {
    /// Executes one request and returns the decoded response
    ///
    /// Implementations map non-success statuses and connection failures to
    /// [`TransportError`]; a returned `SyncResponse` always represents a
    /// successful exchange.
    async fn execute(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError>;
}
