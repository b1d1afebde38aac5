//! In-memory transport replaying canned responses
//!
//! Only built for tests or with the `test-util` feature. Each `perform` pops
//! the next scripted response and streams its body in the configured chunks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use super::{HttpRequest, Transport, TransportResponse};
use crate::memory::ByteCursor;
use crate::{Error, Result};

/// One canned response
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    status: u16,
    chunks: Vec<Bytes>,
    fail_after: Option<usize>,
    chunk_delay: Duration,
}

impl ScriptedResponse {
    /// 200 response delivering `body` as a single chunk
    #[must_use]
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, body)
    }

    #[must_use]
    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            chunks: vec![Bytes::from(body.into())],
            fail_after: None,
            chunk_delay: Duration::ZERO,
        }
    }

    /// Re-split the body into chunks of `size` bytes
    #[must_use]
    pub fn chunked(mut self, size: usize) -> Self {
        let body = self.joined();
        let mut cursor = ByteCursor::new(&body);
        let mut chunks = Vec::new();
        while !cursor.is_empty() {
            chunks.push(Bytes::copy_from_slice(cursor.take(size.max(1))));
        }
        self.chunks = chunks;
        self
    }

    /// Re-split the body at the given offsets
    #[must_use]
    pub fn split_at(mut self, offsets: &[usize]) -> Self {
        let body = self.joined();
        let mut cursor = ByteCursor::new(&body);
        let mut chunks = Vec::new();
        let mut previous = 0;
        for &offset in offsets {
            let offset = offset.clamp(previous, body.len());
            chunks.push(Bytes::copy_from_slice(cursor.take(offset - previous)));
            previous = offset;
        }
        chunks.push(Bytes::copy_from_slice(cursor.take(cursor.remaining())));
        self.chunks = chunks;
        self
    }

    /// Fail with a transport error after delivering `chunks` chunks
    #[must_use]
    pub const fn fail_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }

    /// Sleep before each chunk
    #[must_use]
    pub const fn delay(mut self, per_chunk: Duration) -> Self {
        self.chunk_delay = per_chunk;
        self
    }

    fn joined(&self) -> Vec<u8> {
        self.chunks.iter().flat_map(|c| c.iter().copied()).collect()
    }
}

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the active count when the body stream is dropped
struct ActiveGuard(Arc<Counters>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Transport replaying [`ScriptedResponse`]s in order
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    responses: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
    counters: Arc<Counters>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn push(&self, response: ScriptedResponse) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    /// Requests performed so far
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Highest number of exchanges that were open at the same time
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.counters.peak.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn perform(&self, request: HttpRequest) -> Result<TransportResponse> {
        let active = self.counters.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.peak.fetch_max(active, Ordering::AcqRel);
        let guard = ActiveGuard(Arc::clone(&self.counters));

        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);

        let Some(script) = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        else {
            return Err(Error::Transport("no scripted response left".to_string()));
        };

        let delay = script.chunk_delay;
        let mut items: Vec<Result<Bytes>> = script.chunks.into_iter().map(Ok).collect();
        if let Some(n) = script.fail_after {
            items.truncate(n);
            items.push(Err(Error::Transport("connection reset".to_string())));
        }

        let body = futures::stream::iter(items)
            .then(move |item| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .map(move |item| {
                let _active = &guard;
                item
            })
            .boxed();

        Ok(TransportResponse {
            status: script.status,
            body,
        })
    }
}
