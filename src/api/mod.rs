//! Clients for the cloud speech, language and synthesis APIs
//!
//! All clients share one [`CloudClient`], which owns the transport, the
//! network gate and the memory pools, so every request from this process is
//! serialized through the same gate and drawn from the same budgets.

mod llm;
mod stt;
mod tts;

pub use llm::{LanguageModel, LlmReply};
pub use stt::{SpeechToText, Transcript};
pub use tts::TextToSpeech;

use std::sync::Arc;

use futures::StreamExt;

use crate::config::Config;
use crate::gate::NetworkGate;
use crate::memory::{MemoryPools, ResponseBuffer, TieredAllocator};
use crate::sink::AudioSink;
use crate::stream::{StreamOutcome, StreamingRequest};
use crate::transport::{HttpRequest, ReqwestTransport, Transport, read_limited};
use crate::{Error, Result};

/// Bytes of a failed response body kept for the error message
const ERROR_BODY_LIMIT: usize = 1024;

struct ClientInner {
    config: Config,
    transport: Arc<dyn Transport>,
    gate: NetworkGate,
    pools: MemoryPools,
}

/// Shared request context; clones are cheap and share the gate
#[derive(Clone)]
pub struct CloudClient {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("config", &self.inner.config)
            .field("gate_held", &self.inner.gate.is_held())
            .finish_non_exhaustive()
    }
}

impl CloudClient {
    /// Client over HTTPS with a fresh gate
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.http.request_timeout)?;
        Ok(Self::with_transport(
            config,
            Arc::new(transport),
            NetworkGate::new(),
        ))
    }

    /// Client over an arbitrary transport and an existing gate
    #[must_use]
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
        gate: NetworkGate,
    ) -> Self {
        let pools = MemoryPools::from_config(&config.memory);
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                gate,
                pools,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[must_use]
    pub fn gate(&self) -> &NetworkGate {
        &self.inner.gate
    }

    #[must_use]
    pub fn pools(&self) -> &MemoryPools {
        &self.inner.pools
    }

    /// Allocator trying `preferred` bytes first, then the configured fallbacks
    #[must_use]
    pub fn allocator(&self, preferred: usize) -> TieredAllocator {
        self.inner
            .pools
            .allocator(preferred, &self.inner.config.memory)
    }

    /// `endpoint` with the API key appended as a query parameter
    pub(crate) fn keyed_url(&self, endpoint: &str) -> Result<String> {
        let key = self.inner.config.api_key()?;
        let separator = if endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{endpoint}{separator}key={key}"))
    }

    /// Perform `request` and read the whole body into a tiered buffer
    ///
    /// The body must fit the granted capacity, which may be smaller than
    /// `preferred`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BufferFull`] if the body outgrows the buffer, plus the
    /// gate, allocation and HTTP errors of the request itself
    pub async fn post_buffered(
        &self,
        request: HttpRequest,
        preferred: usize,
    ) -> Result<ResponseBuffer> {
        let url = request.redacted_url().to_string();
        let mut token = self
            .inner
            .gate
            .acquire(self.inner.config.gate.acquire_timeout)
            .await?;
        let mut buffer = self.allocator(preferred).allocate()?.buffer;

        let response = self.inner.transport.perform(request).await?;
        if !response.is_success() {
            let body = read_limited(response.body, ERROR_BODY_LIMIT)
                .await
                .unwrap_or_default();
            tracing::error!(url = %url, status = response.status, "request rejected");
            return Err(Error::HttpStatus {
                status: response.status,
                body,
            });
        }

        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            if let Err(e) = buffer.extend_from_slice(&chunk) {
                tracing::error!(
                    url = %url,
                    capacity = buffer.capacity(),
                    received = buffer.len() + chunk.len(),
                    "response larger than buffer"
                );
                return Err(e);
            }
        }
        drop(body);
        token.release();

        if buffer.is_empty() {
            return Err(Error::TruncatedResponse(format!("empty response from {url}")));
        }

        tracing::debug!(url = %url, bytes = buffer.len(), "buffered response");
        Ok(buffer)
    }

    /// Perform `request` and stream the base64 string field `field` into `sink`
    ///
    /// # Errors
    ///
    /// See [`StreamingRequest::run`]
    pub async fn post_streaming<S>(
        &self,
        request: HttpRequest,
        field: &str,
        sink: &mut S,
    ) -> Result<StreamOutcome>
    where
        S: AudioSink + ?Sized,
    {
        let allocator = self.allocator(self.inner.config.memory.stream_buffer);
        StreamingRequest::new(
            &*self.inner.transport,
            &self.inner.gate,
            &allocator,
            field,
        )
        .gate_timeout(self.inner.config.gate.acquire_timeout)
        .run(request, sink)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedResponse, ScriptedTransport};

    fn client(transport: ScriptedTransport, tweak: impl FnOnce(&mut Config)) -> CloudClient {
        let mut config = Config::default();
        config.api.api_key = Some("test-key".to_string());
        tweak(&mut config);
        CloudClient::with_transport(config, Arc::new(transport), NetworkGate::new())
    }

    fn request() -> HttpRequest {
        HttpRequest::post_json("https://api.test/v1/x", &serde_json::json!({"q": 1})).unwrap()
    }

    #[test]
    fn keyed_url_appends_key() {
        let keyed = client(ScriptedTransport::default(), |_| {});
        assert_eq!(
            keyed.keyed_url("https://api.test/v1/x").unwrap(),
            "https://api.test/v1/x?key=test-key"
        );
        assert_eq!(
            keyed.keyed_url("https://api.test/v1/x?alt=json").unwrap(),
            "https://api.test/v1/x?alt=json&key=test-key"
        );

        let keyless = client(ScriptedTransport::default(), |c| c.api.api_key = None);
        assert!(matches!(keyless.keyed_url("https://a"), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn buffered_body_is_collected() {
        let transport = ScriptedTransport::new([ScriptedResponse::ok(r#"{"ok":true}"#).chunked(3)]);
        let client = client(transport, |_| {});

        let buffer = client.post_buffered(request(), 1024).await.unwrap();
        assert_eq!(buffer.as_slice(), br#"{"ok":true}"#);
        assert!(!client.gate().is_held());
    }

    #[tokio::test]
    async fn buffered_body_must_fit_granted_tier() {
        let transport = ScriptedTransport::new([ScriptedResponse::ok(vec![b'x'; 64]).chunked(16)]);
        let client = client(transport, |c| {
            c.memory.psram_budget = Some(0);
            c.memory.internal_budget = Some(0);
            c.memory.fallback_buffer = 48;
            c.memory.minimum_buffer = 32;
        });

        let err = client.post_buffered(request(), 128).await.unwrap_err();
        assert!(matches!(err, Error::BufferFull { capacity: 48 }));
        assert!(!client.gate().is_held());
        assert_eq!(client.gate().releases(), 1);
    }

    #[tokio::test]
    async fn http_error_keeps_body_excerpt() {
        let transport = ScriptedTransport::new([ScriptedResponse::with_status(
            403,
            r#"{"error":{"code":403,"message":"API key not valid"}}"#,
        )]);
        let client = client(transport, |_| {});

        let err = client.post_buffered(request(), 1024).await.unwrap_err();
        match err {
            Error::HttpStatus { status, body } => {
                assert_eq!(status, 403);
                assert!(body.contains("API key not valid"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
