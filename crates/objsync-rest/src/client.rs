//! Typed REST client
//!
//! Wraps `reqwest::Client` with base URL joining, bearer authentication,
//! JSON bodies, and a single Retry-After-honoring retry on 429. Everything
//! beyond that single retry is the remote's problem or the engine's next
//! cycle; the sync core performs exactly one attempt per operation.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use objsync_rest::client::RestClient;
//!
//! # fn example() -> anyhow::Result<()> {
//! let client = RestClient::new("https://api.example.com/v1")?
//!     .with_bearer_token("access-token-here");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, Method, Response};
use serde_json::Value;
use tracing::{debug, warn};

/// Default per-request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fallback wait when a 429 response carries no Retry-After header
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Upper bound on how long a Retry-After header is honored
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// HTTP client for the remote resource store
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Clone)]
pub struct RestClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL all request paths are joined onto
    base_url: String,
    /// Bearer token attached to every request, when set
    bearer_token: Option<String>,
}

impl RestClient {
    /// Creates a client with the default timeout
    ///
    /// # Arguments
    /// * `base_url` - Absolute base URL of the remote store
    ///
    /// # Errors
    /// Fails if `base_url` is not a valid absolute URL.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit per-request timeout
    pub fn with_timeout(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.as_ref();
        url::Url::parse(base_url)
            .with_context(|| format!("Invalid base URL: {base_url}"))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: None,
        })
    }

    /// Creates a client from the engine's remote configuration
    pub fn from_config(config: &objsync_core::config::RemoteConfig) -> Result<Self> {
        Self::with_timeout(&config.base_url, Duration::from_secs(config.timeout_secs))
    }

    /// Sets the bearer token attached to every request
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Returns the configured base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one request, retrying once if the remote rate-limits it
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - Path joined onto the base URL (e.g. `/tasks/42`)
    /// * `body` - Optional JSON body
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> reqwest::Result<Response> {
        let response = self.submit(method.clone(), path, body).await?;
        if response.status().as_u16() != 429 {
            return Ok(response);
        }

        let wait = parse_retry_after(&response)
            .unwrap_or(DEFAULT_RETRY_AFTER)
            .min(MAX_RETRY_AFTER);
        warn!(
            path,
            wait_secs = wait.as_secs(),
            "Rate limited, retrying once after Retry-After"
        );
        tokio::time::sleep(wait).await;
        self.submit(method, path, body).await
    }

    async fn submit(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> reqwest::Result<Response> {
        let endpoint = self.endpoint(path);
        debug!(%method, %endpoint, "Sending request");

        let mut request = self.client.request(method, &endpoint);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Parses a Retry-After header given in delay-seconds form
///
/// HTTP-date form is not supported; callers fall back to a default wait.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
