//! Request lifecycle for streamed responses

use std::time::{Duration, Instant};

use futures::StreamExt;

use super::pipeline::{AudioPipeline, PipelineFlow};
use crate::gate::NetworkGate;
use crate::memory::{Allocation, TieredAllocator};
use crate::sink::AudioSink;
use crate::transport::{HttpRequest, Transport, read_limited};
use crate::{Error, Result};

/// Default bound on waiting for the network gate
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes of a failed response body kept for the error message
const ERROR_BODY_LIMIT: usize = 1024;

/// Lifecycle of one streaming request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    GateWait,
    Streaming,
    Completed,
    Failed,
}

/// How a successful stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// The whole field was decoded and delivered
    Completed,
    /// The sink asked to stop before the end
    Stopped,
}

/// Result of a streaming request that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub status: StreamStatus,
    pub bytes_delivered: u64,
    pub deliveries: u64,
    pub http_status: u16,
    /// Granted staging capacity, possibly below the preferred size
    pub buffer_capacity: usize,
    pub buffer_pool: String,
}

impl StreamOutcome {
    /// Delivered 16-bit samples
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.bytes_delivered / 2
    }
}

/// One streamed request from gate acquisition to release
///
/// The gate is held for the whole exchange and released before `run`
/// returns on every path. Staging memory is released with it.
pub struct StreamingRequest<'a> {
    transport: &'a dyn Transport,
    gate: &'a NetworkGate,
    allocator: &'a TieredAllocator,
    field: &'a str,
    gate_timeout: Duration,
    phase: RequestPhase,
}

impl<'a> StreamingRequest<'a> {
    #[must_use]
    pub fn new(
        transport: &'a dyn Transport,
        gate: &'a NetworkGate,
        allocator: &'a TieredAllocator,
        field: &'a str,
    ) -> Self {
        Self {
            transport,
            gate,
            allocator,
            field,
            gate_timeout: DEFAULT_GATE_TIMEOUT,
            phase: RequestPhase::Idle,
        }
    }

    #[must_use]
    pub const fn gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Perform `request` and stream the decoded field into `sink`
    ///
    /// Audio handed to the sink before a failure stays delivered.
    ///
    /// # Errors
    ///
    /// - [`Error::GateTimeout`] if another request holds the gate too long
    /// - [`Error::OutOfMemory`] if no staging tier can be allocated
    /// - [`Error::HttpStatus`] for a non-2xx response
    /// - [`Error::MalformedInput`] / [`Error::MalformedJson`] for a bad body
    /// - [`Error::TruncatedResponse`] if the body ends before the field closes
    pub async fn run<S>(&mut self, request: HttpRequest, sink: &mut S) -> Result<StreamOutcome>
    where
        S: AudioSink + ?Sized,
    {
        let started = Instant::now();
        let result = self.execute(request, sink).await;

        match &result {
            Ok(outcome) => {
                self.phase = RequestPhase::Completed;
                tracing::info!(
                    field = self.field,
                    status = ?outcome.status,
                    bytes = outcome.bytes_delivered,
                    deliveries = outcome.deliveries,
                    elapsed_ms = started.elapsed().as_millis(),
                    "streaming request finished"
                );
            }
            Err(e) => {
                self.phase = RequestPhase::Failed;
                tracing::error!(
                    field = self.field,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis(),
                    "streaming request failed"
                );
            }
        }

        result
    }

    async fn execute<S>(&mut self, request: HttpRequest, sink: &mut S) -> Result<StreamOutcome>
    where
        S: AudioSink + ?Sized,
    {
        self.phase = RequestPhase::GateWait;
        let mut token = self.gate.acquire(self.gate_timeout).await?;

        let Allocation { buffer, tier } = self.allocator.allocate()?;
        let buffer_pool = buffer.pool().to_string();
        tracing::debug!(
            capacity = buffer.capacity(),
            pool = %buffer_pool,
            tier,
            "staging buffer ready"
        );

        self.phase = RequestPhase::Streaming;
        let response = self.transport.perform(request).await?;
        let http_status = response.status;

        if !response.is_success() {
            let body = read_limited(response.body, ERROR_BODY_LIMIT)
                .await
                .unwrap_or_default();
            return Err(Error::HttpStatus {
                status: http_status,
                body,
            });
        }

        let mut body = response.body;
        let mut pipeline = AudioPipeline::new(self.field, buffer, sink);
        let buffer_capacity = pipeline.capacity();

        while let Some(chunk) = body.next().await {
            match pipeline.push(&chunk?)? {
                PipelineFlow::NeedMore => {}
                PipelineFlow::Complete | PipelineFlow::Stopped => break,
            }
        }
        // stop reading before the gate is handed on
        drop(body);

        let report = pipeline.finish()?;
        token.release();

        Ok(StreamOutcome {
            status: if report.stopped {
                StreamStatus::Stopped
            } else {
                StreamStatus::Completed
            },
            bytes_delivered: report.bytes_delivered,
            deliveries: report.deliveries,
            http_status,
            buffer_capacity,
            buffer_pool,
        })
    }
}
