//! Scanner → decoder → staging buffer → sink

use std::ops::ControlFlow;

use crate::codec::Base64Decoder;
use crate::memory::ResponseBuffer;
use crate::scanner::{FieldScanner, ScanState};
use crate::sink::{AudioSink, SinkControl};
use crate::Result;

/// What the pipeline wants after a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineFlow {
    /// Target value not finished yet
    NeedMore,
    /// Value closed and every decoded byte delivered
    Complete,
    /// The sink asked to stop
    Stopped,
}

/// Totals once the pipeline is finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub bytes_delivered: u64,
    pub deliveries: u64,
    pub stopped: bool,
}

/// Staging buffer and the sink it drains into
struct Delivery<'s, S: AudioSink + ?Sized> {
    staging: ResponseBuffer,
    sink: &'s mut S,
    delivered: u64,
    deliveries: u64,
    stopped: bool,
}

impl<S: AudioSink + ?Sized> Delivery<'_, S> {
    fn write(&mut self, bytes: &[u8]) -> Result<ControlFlow<()>> {
        for &byte in bytes {
            if self.staging.is_full() && self.flush().is_break() {
                return Ok(ControlFlow::Break(()));
            }
            self.staging.push(byte)?;
        }
        Ok(ControlFlow::Continue(()))
    }

    fn flush(&mut self) -> ControlFlow<()> {
        match self.deliver() {
            SinkControl::Continue => ControlFlow::Continue(()),
            SinkControl::Stop => {
                tracing::info!(delivered = self.delivered, "sink requested stop");
                self.stopped = true;
                ControlFlow::Break(())
            }
        }
    }

    /// Hand the staged bytes to the sink
    fn deliver(&mut self) -> SinkControl {
        if self.staging.is_empty() {
            return SinkControl::Continue;
        }

        let len = self.staging.len();
        let control = self.sink.deliver(self.staging.as_slice());
        self.staging.clear();
        self.delivered += len as u64;
        self.deliveries += 1;
        tracing::trace!(bytes = len, total = self.delivered, "delivered audio");
        control
    }
}

/// Synchronous per-request decoding pipeline
///
/// Every decoded byte passes through the staging buffer, which is handed to
/// the sink each time it fills and once more at the end of the value. Bytes
/// reach the sink at most once and in order.
pub struct AudioPipeline<'s, S: AudioSink + ?Sized> {
    scanner: FieldScanner,
    decoder: Option<Base64Decoder>,
    delivery: Delivery<'s, S>,
}

impl<'s, S: AudioSink + ?Sized> AudioPipeline<'s, S> {
    /// Pipeline extracting the base64 string field `field`
    pub fn new(field: &str, staging: ResponseBuffer, sink: &'s mut S) -> Self {
        Self {
            scanner: FieldScanner::new(field),
            decoder: Some(Base64Decoder::new()),
            delivery: Delivery {
                staging,
                sink,
                delivered: 0,
                deliveries: 0,
                stopped: false,
            },
        }
    }

    /// Staging buffer capacity, the size of a full delivery
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.delivery.staging.capacity()
    }

    #[must_use]
    pub const fn scan_state(&self) -> ScanState {
        self.scanner.state()
    }

    /// Feed one body chunk
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MalformedInput`] or
    /// [`crate::Error::MalformedJson`] on the first bad byte
    pub fn push(&mut self, chunk: &[u8]) -> Result<PipelineFlow> {
        if self.delivery.stopped {
            return Ok(PipelineFlow::Stopped);
        }

        let Self {
            scanner,
            decoder,
            delivery,
        } = self;

        let Some(active) = decoder.as_mut() else {
            return Ok(PipelineFlow::Complete);
        };

        let state = scanner.feed(chunk, |symbol| {
            let decoded = active.feed_symbol(symbol)?;
            delivery.write(decoded.as_slice())
        })?;

        if delivery.stopped {
            return Ok(PipelineFlow::Stopped);
        }
        if state != ScanState::Done {
            return Ok(PipelineFlow::NeedMore);
        }

        if let Some(finished) = decoder.take() {
            let tail = finished.finish()?;
            if delivery.write(tail.as_slice())?.is_break() {
                return Ok(PipelineFlow::Stopped);
            }
            // Nothing is left to withhold once the last delivery is made
            if delivery.deliver() == SinkControl::Stop {
                tracing::debug!(delivered = delivery.delivered, "sink stopped on last delivery");
            }
        }

        Ok(PipelineFlow::Complete)
    }

    /// Close the pipeline at end of body
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::TruncatedResponse`] if the body ended before
    /// the value closed, unless the sink had already stopped the stream
    pub fn finish(self) -> Result<PipelineReport> {
        let delivery = self.delivery;
        if !delivery.stopped {
            self.scanner.finish()?;
        }

        Ok(PipelineReport {
            bytes_delivered: delivery.delivered,
            deliveries: delivery.deliveries,
            stopped: delivery.stopped,
        })
    }
}

#[cfg(test)]
mod tests {
    use ::base64::Engine;
    use ::base64::engine::general_purpose::STANDARD;

    use super::*;
    use crate::Error;
    use crate::sink::CollectSink;

    fn body_for(audio: &[u8]) -> Vec<u8> {
        format!(r#"{{"audioContent":"{}"}}"#, STANDARD.encode(audio)).into_bytes()
    }

    #[test]
    fn deliveries_are_capped_at_staging_capacity() {
        let audio: Vec<u8> = (0..=255).collect();
        let mut sink = CollectSink::new();
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(64), &mut sink);

        assert_eq!(pipeline.push(&body_for(&audio)).unwrap(), PipelineFlow::Complete);
        let report = pipeline.finish().unwrap();

        assert_eq!(report.bytes_delivered, 256);
        assert_eq!(report.deliveries, 4);
        assert_eq!(sink.bytes(), audio.as_slice());
    }

    #[test]
    fn tail_is_flushed_on_close() {
        let mut sink = CollectSink::new();
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(4), &mut sink);

        pipeline.push(br#"{"audioContent":"SGVsbG8"#).unwrap();
        assert_eq!(pipeline.push(b"=\"}").unwrap(), PipelineFlow::Complete);
        assert_eq!(pipeline.push(b"ignored").unwrap(), PipelineFlow::Complete);
        let report = pipeline.finish().unwrap();

        assert_eq!(sink.bytes(), b"Hello");
        assert_eq!(report.deliveries, 2);
        assert!(!report.stopped);
    }

    #[test]
    fn stop_ends_stream_without_error() {
        let audio = vec![7u8; 100];
        let mut sink = CollectSink::stop_after(10);
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(10), &mut sink);

        assert_eq!(pipeline.push(&body_for(&audio)).unwrap(), PipelineFlow::Stopped);
        let report = pipeline.finish().unwrap();

        assert!(report.stopped);
        assert_eq!(report.bytes_delivered, 10);
        assert_eq!(sink.deliveries(), 1);
    }

    #[test]
    fn stop_on_last_delivery_is_complete() {
        let mut sink = CollectSink::stop_after(5);
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(64), &mut sink);

        assert_eq!(pipeline.push(&body_for(b"Hello")).unwrap(), PipelineFlow::Complete);
        let report = pipeline.finish().unwrap();

        assert!(!report.stopped);
        assert_eq!(report.bytes_delivered, 5);
        assert_eq!(report.deliveries, 1);
        assert_eq!(sink.bytes(), b"Hello");
    }

    #[test]
    fn stop_with_tail_pending_is_stopped() {
        let mut sink = CollectSink::stop_after(4);
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(4), &mut sink);

        assert_eq!(pipeline.push(&body_for(b"Hello")).unwrap(), PipelineFlow::Stopped);
        let report = pipeline.finish().unwrap();

        assert!(report.stopped);
        assert_eq!(sink.bytes(), b"Hell");
    }

    #[test]
    fn bad_symbol_aborts() {
        let mut sink = CollectSink::new();
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(16), &mut sink);

        let err = pipeline.push(br#"{"audioContent":"AB*D"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { position: 2, byte: b'*' }));
        drop(pipeline);
        assert_eq!(sink.deliveries(), 0);
    }

    #[test]
    fn dangling_symbol_at_close_is_malformed() {
        let mut sink = CollectSink::new();
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(16), &mut sink);

        let err = pipeline.push(br#"{"audioContent":"SGVsb"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedInput { .. }));
    }

    #[test]
    fn unterminated_value_is_truncated() {
        let mut sink = CollectSink::new();
        let mut pipeline =
            AudioPipeline::new("audioContent", ResponseBuffer::unpooled(16), &mut sink);

        assert_eq!(
            pipeline.push(br#"{"audioContent":"SGVs"#).unwrap(),
            PipelineFlow::NeedMore
        );
        assert!(matches!(pipeline.finish(), Err(Error::TruncatedResponse(_))));
        assert_eq!(sink.bytes(), b"");
    }
}
