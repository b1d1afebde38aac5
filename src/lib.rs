//! Somnus cloud - memory-bounded cloud speech clients for the Somnus voice device
//!
//! This library provides:
//! - Speech-to-text, text generation and text-to-speech clients
//! - A streaming response decoder that turns a chunked JSON body carrying
//!   base64 audio into PCM without buffering the document
//! - Tiered response buffers drawn from budgeted memory pools
//! - A single-flight gate serializing secure connections
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │          VoiceAssistant  │  CLI (somnus)             │
//! └────────────────────┬─────────────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────────────┐
//! │   CloudClient: SpeechToText │ LanguageModel │ TTS    │
//! │   NetworkGate │ TieredAllocator │ Transport          │
//! └────────────────────┬─────────────────────────────────┘
//!                      │ body chunks
//! ┌────────────────────▼─────────────────────────────────┐
//! │   FieldScanner → Base64Decoder → staging → AudioSink │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod assistant;
pub mod codec;
pub mod config;
pub mod error;
pub mod gate;
pub mod memory;
pub mod scanner;
pub mod sink;
pub mod stream;
pub mod transport;

pub use api::{CloudClient, LanguageModel, LlmReply, SpeechToText, TextToSpeech, Transcript};
pub use assistant::{AssistantTurn, VoiceAssistant};
pub use codec::Base64Decoder;
pub use config::Config;
pub use error::{Error, Result};
pub use gate::{GateToken, NetworkGate};
pub use memory::{Allocation, MemoryPool, MemoryPools, ResponseBuffer, Tier, TieredAllocator};
pub use scanner::{FieldScanner, ScanState};
pub use sink::{AudioSink, CollectSink, SinkControl, WavSink};
pub use stream::{RequestPhase, StreamOutcome, StreamStatus, StreamingRequest};
pub use transport::{HttpRequest, ReqwestTransport, Transport, TransportResponse};
