//! Dashboard API fetcher
//!
//! Pulls the graph snapshot, telemetry feed and health report from the
//! agent platform. Every call is a best-effort poll: callers log a
//! [`FetchError`] and keep whatever state they had.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::snapshot::{HealthReport, Snapshot, TelemetryPayload};

pub const GRAPH_PATH: &str = "/api/dashboard/graph";
pub const TELEMETRY_PATH: &str = "/api/dashboard/telemetry";
pub const HEALTH_PATH: &str = "/api/health";

/// Errors from a single poll of one endpoint
#[derive(Error, Debug)]
pub enum FetchError {
    /// The HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    Client(#[source] reqwest::Error),

    /// Connection failure or timeout
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// The body is not the expected JSON shape
    #[error("could not decode {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Whether the failure happened before a response body was decoded
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network { .. } | FetchError::Status { .. })
    }
}

/// Source of dashboard data polled by the supervisor
///
/// Implemented over HTTP by [`HttpFetcher`]; tests and offline tools can
/// provide their own.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch_graph(&self) -> impl Future<Output = Result<Snapshot, FetchError>> + Send;

    fn fetch_telemetry(&self) -> impl Future<Output = Result<TelemetryPayload, FetchError>> + Send;

    fn fetch_health(&self) -> impl Future<Output = Result<HealthReport, FetchError>> + Send;
}

/// Fetches dashboard endpoints relative to a base URL
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base: String,
}

impl HttpFetcher {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base, path);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Network {
                url: url.clone(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

impl SnapshotSource for HttpFetcher {
    async fn fetch_graph(&self) -> Result<Snapshot, FetchError> {
        self.get_json(GRAPH_PATH).await
    }

    async fn fetch_telemetry(&self) -> Result<TelemetryPayload, FetchError> {
        self.get_json(TELEMETRY_PATH).await
    }

    async fn fetch_health(&self) -> Result<HealthReport, FetchError> {
        self.get_json(HEALTH_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base() {
        let fetcher = HttpFetcher::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(fetcher.base(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transient_network_error() {
        // Port 9 (discard) on localhost is closed on any sane test host.
        let fetcher = HttpFetcher::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = fetcher.fetch_graph().await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }), "{err}");
        assert!(err.is_transient());
    }
}
