//! Error types for the Somnus cloud client

use std::time::Duration;

use thiserror::Error;

/// Result type alias for Somnus cloud operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the cloud APIs
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No allocation tier could satisfy the request
    #[error("out of memory: no allocation tier succeeded (preferred {requested} bytes)")]
    OutOfMemory {
        /// Size of the first (preferred) tier
        requested: usize,
    },

    /// Another secure connection held the network gate past the deadline
    #[error("network gate busy for {0:?}")]
    GateTimeout(Duration),

    /// Base64 input contained a symbol that cannot appear at its position
    #[error("malformed base64 input: byte 0x{byte:02x} at symbol {position}")]
    MalformedInput {
        /// Zero-based index of the offending symbol in the decoded stream
        position: u64,
        /// Offending input byte
        byte: u8,
    },

    /// Invalid JSON escape inside the target field
    #[error("malformed JSON at byte {offset}: {reason}")]
    MalformedJson {
        /// Offset into the response body
        offset: u64,
        reason: String,
    },

    /// The response ended before the target field was fully captured
    #[error("truncated response: {0}")]
    TruncatedResponse(String),

    /// A write would have exceeded the granted buffer capacity
    #[error("response buffer full (capacity {capacity} bytes)")]
    BufferFull {
        /// Granted capacity of the buffer
        capacity: usize,
    },

    /// Non-2xx HTTP status
    #[error("http status {status}: {body}")]
    HttpStatus {
        /// Status code returned by the server
        status: u16,
        /// Leading part of the error body
        body: String,
    },

    /// Transport failure outside of reqwest (e.g. scripted transports)
    #[error("transport error: {0}")]
    Transport(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text generation error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether re-issuing the whole request could succeed
    ///
    /// Nothing in this crate retries internally; this only informs the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::GateTimeout(_) | Self::TruncatedResponse(_) | Self::Transport(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
