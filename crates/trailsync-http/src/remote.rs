//! `RemoteStore` over HTTP

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use trailsync_core::{ProgressReport, RemoteError, RemoteStore, SelectionPayload};

/// Default per-request deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote store reached with plain JSON requests
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    /// Create store with a client using [`DEFAULT_TIMEOUT`]
    ///
    /// # Errors
    /// Returns the client build error (TLS backend initialisation)
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create store over an existing client
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Base URL all endpoints hang off
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an endpoint path
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    async fn fetch_json(&self, request: RequestBuilder) -> Result<Value, RemoteError> {
        let response = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(map_error)?;
        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::Body(e.to_string()))
    }

    async fn post(&self, request: RequestBuilder) -> Result<(), RemoteError> {
        request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map(|_| ())
            .map_err(map_error)
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn map_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if let Some(status) = err.status() {
        RemoteError::Status(status.as_u16())
    } else if err.is_decode() || err.is_body() {
        RemoteError::Body(err.to_string())
    } else {
        RemoteError::Network(err.to_string())
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_selections(&self, user_id: &str) -> Result<Value, RemoteError> {
        let request = self
            .client
            .get(self.url("learning/selections"))
            .query(&[("userId", user_id)]);
        self.fetch_json(request).await
    }

    async fn save_selections(&self, payload: &SelectionPayload) -> Result<(), RemoteError> {
        tracing::debug!(items = payload.selected_items.len(), "posting selections");
        self.post(self.client.post(self.url("learning/selections")).json(payload))
            .await
    }

    async fn fetch_progress(&self) -> Result<Value, RemoteError> {
        self.fetch_json(self.client.get(self.url("progress"))).await
    }

    async fn save_progress(&self, report: &ProgressReport) -> Result<(), RemoteError> {
        tracing::debug!(kind = %report.kind, "posting progress");
        self.post(self.client.post(self.url("progress/save")).json(report))
            .await
    }
}
