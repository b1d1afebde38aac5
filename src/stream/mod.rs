//! Streaming response decoding
//!
//! [`StreamingRequest`] owns a request from gate acquisition to release and
//! pumps each body chunk through an [`AudioPipeline`]: the field scanner
//! picks the base64 value out of the JSON body, the decoder turns it into
//! PCM, and full staging buffers are handed to the caller's sink.

mod pipeline;
mod request;

pub use pipeline::{AudioPipeline, PipelineFlow, PipelineReport};
pub use request::{
    DEFAULT_GATE_TIMEOUT, RequestPhase, StreamOutcome, StreamStatus, StreamingRequest,
};
