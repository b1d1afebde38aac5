//! `reqwest`-backed transport

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};

use super::{HttpRequest, Transport, TransportResponse};
use crate::{Error, Result};

/// Transport over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialized
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn perform(&self, request: HttpRequest) -> Result<TransportResponse> {
        let url = request.redacted_url().to_string();
        let started = Instant::now();

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        // reqwest errors carry the full URL, and with it the API key
        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                tracing::error!(url = %url, error = %e, "request failed");
                e
            })?;

        let status = response.status().as_u16();
        tracing::info!(
            url = %url,
            status,
            elapsed_ms = started.elapsed().as_millis(),
            "received response"
        );

        let body = response
            .bytes_stream()
            .map_err(|e| Error::from(e.without_url()))
            .boxed();
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_error_omits_api_key() {
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        let request = HttpRequest::post_json(
            "http://127.0.0.1:1/v1/text:synthesize?key=SUPERSECRET",
            &serde_json::json!({"input": {"text": "hi"}}),
        )
        .unwrap();

        let err = transport.perform(request).await.err().unwrap();

        assert!(matches!(err, Error::Http(_)));
        assert!(!err.to_string().contains("SUPERSECRET"));
        assert!(!format!("{err:?}").contains("SUPERSECRET"));
    }
}
