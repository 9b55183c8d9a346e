//! Executing calls over the network.
//!
//! # Design
//! Everything else in the crate is I/O-free. `Transport` is the one seam where
//! a request becomes a response; `ReqwestTransport` is the stock
//! implementation and tests substitute a mock. `Client` pairs a transport with
//! the calls and batches the builders produce.

use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::batch::{Batch, BatchRequest, BatchResults};
use crate::call::Call;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one round-trip. Non-2xx statuses are responses, not errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, url = %request.url, "request failed");
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Runs calls and flushes batches through a `Transport`.
#[derive(Debug, Clone)]
pub struct Client<T> {
    transport: T,
}

impl Client<ReqwestTransport> {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Ok(Self::new(ReqwestTransport::new(config)?))
    }
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send an immediate call and parse its response.
    ///
    /// Deferred calls are rejected; flush their batch and `resolve` them.
    pub async fn execute<R>(&self, call: Call<R>) -> Result<R, ApiError> {
        let request = call.request().cloned().ok_or_else(|| {
            ApiError::Batch("call is queued in a batch; flush the batch instead".to_string())
        })?;
        let (method, url) = (request.method, request.url.clone());
        let response = self.transport.send(request).await?;
        if (200..300).contains(&response.status) {
            tracing::info!(%method, %url, status = response.status, "call completed");
        } else {
            tracing::warn!(%method, %url, status = response.status, "call failed");
        }
        call.parse(response)
    }

    /// Send every queued call of `batch` as one request.
    ///
    /// The queue is drained before sending; calls attached while the request
    /// is in flight go out with the next flush.
    pub async fn flush(&self, batch: &Batch) -> Result<BatchResults, ApiError> {
        let BatchRequest { request, receipt } = batch.build_request()?;
        let response = self.transport.send(request).await?;
        tracing::info!(
            batch = %batch.id(),
            parts = receipt.parts(),
            status = response.status,
            "batch flushed"
        );
        receipt.parse_response(response)
    }
}
