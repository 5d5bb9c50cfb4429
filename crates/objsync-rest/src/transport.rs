//! HttpTransport - ITransport implementation over the REST client
//!
//! Maps the engine's [`SyncRequest`] onto HTTP and classifies every failure
//! into the port's [`TransportError`] taxonomy: timeouts, connection-level
//! failures, non-success statuses, and undecodable bodies.

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use objsync_core::ports::transport::{
    HttpMethod, ITransport, SyncRequest, SyncResponse, TransportError,
};

use crate::client::RestClient;

/// Longest response body excerpt carried in a status error
const STATUS_MESSAGE_LIMIT: usize = 512;

/// `ITransport` implementation over plain JSON-over-HTTP
pub struct HttpTransport {
    client: RestClient,
}

impl HttpTransport {
    /// Creates a transport over the given client
    pub fn new(client: RestClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ITransport for HttpTransport {
    async fn execute(&self, request: &SyncRequest) -> Result<SyncResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        };

        let response = self
            .client
            .send(method, &request.path, request.payload.as_ref())
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.text().await {
                Ok(text) => excerpt(&text),
                Err(_) => status
                    .canonical_reason()
                    .unwrap_or("unknown status")
                    .to_string(),
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        let body = if bytes.is_empty() {
            None
        } else {
            Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| TransportError::Decode(e.to_string()))?,
            )
        };

        debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "Request completed"
        );
        Ok(SyncResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Maps a reqwest failure into the port taxonomy
fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_decode() {
        TransportError::Decode(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Truncates a response body for inclusion in an error message
fn excerpt(text: &str) -> String {
    if text.len() <= STATUS_MESSAGE_LIMIT {
        text.to_string()
    } else {
        let mut end = STATUS_MESSAGE_LIMIT;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}
