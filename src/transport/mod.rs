//! HTTP transport seam
//!
//! The core never opens connections itself: it hands an [`HttpRequest`] to a
//! [`Transport`] and consumes the status code plus the body as a stream of
//! chunks whose boundaries carry no meaning.

mod http;
#[cfg(any(test, feature = "test-util"))]
mod scripted;

pub use http::ReqwestTransport;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ScriptedResponse, ScriptedTransport};

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::Result;

/// Response body as it arrives
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A JSON POST to one of the cloud APIs
#[derive(Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// POST request with a serialized JSON body
    ///
    /// # Errors
    ///
    /// Returns error if `payload` fails to serialize
    pub fn post_json<T: Serialize>(url: impl Into<String>, payload: &T) -> Result<Self> {
        Ok(Self {
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(payload)?,
        })
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// URL without its query string, safe to log
    #[must_use]
    pub fn redacted_url(&self) -> &str {
        self.url.split('?').next().unwrap_or_default()
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("url", &self.redacted_url())
            .field("body_bytes", &self.body.len())
            .finish_non_exhaustive()
    }
}

/// Status line plus streaming body
pub struct TransportResponse {
    pub status: u16,
    pub body: BodyStream,
}

impl TransportResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Performs one HTTPS exchange
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return once the status is known
    async fn perform(&self, request: HttpRequest) -> Result<TransportResponse>;
}

/// Read at most `limit` bytes of a body, for error messages
///
/// The rest of the body is discarded unread.
pub async fn read_limited(mut body: BodyStream, limit: usize) -> Result<String> {
    let mut out = Vec::new();
    while out.len() < limit {
        let Some(chunk) = body.next().await else {
            break;
        };
        let chunk = chunk?;
        let take = chunk.len().min(limit - out.len());
        out.extend_from_slice(&chunk[..take]);
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}
