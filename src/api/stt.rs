//! Speech-to-text (STT) via Google Speech-to-Text

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::CloudClient;
use crate::codec::{AudioStats, pcm16_to_wav};
use crate::transport::HttpRequest;
use crate::{Error, Result};

/// Result of a recognition request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcript {
    Speech(String),
    /// The service returned no transcript for the audio
    NoSpeech,
}

impl Transcript {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Speech(text) => Some(text),
            Self::NoSpeech => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'a str,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    results: Option<Vec<RecognitionResult>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct RecognitionResult {
    alternatives: Option<Vec<Alternative>>,
}

#[derive(Deserialize)]
struct Alternative {
    transcript: Option<String>,
    confidence: Option<f32>,
}

#[derive(Deserialize)]
struct ApiError {
    code: Option<i64>,
    #[serde(default)]
    message: String,
}

/// Transcribes 16-bit mono captures
#[derive(Debug, Clone)]
pub struct SpeechToText {
    client: CloudClient,
}

impl SpeechToText {
    #[must_use]
    pub const fn new(client: CloudClient) -> Self {
        Self { client }
    }

    /// Transcribe PCM samples captured at the configured capture rate
    ///
    /// # Errors
    ///
    /// Returns error if the capture is empty, the request fails, or the
    /// service reports an error
    pub async fn transcribe(&self, samples: &[i16]) -> Result<Transcript> {
        let rate = self.client.config().voice.capture_sample_rate;
        self.transcribe_at(samples, rate).await
    }

    /// Transcribe PCM samples captured at `rate` Hz
    ///
    /// # Errors
    ///
    /// Same as [`Self::transcribe`]
    pub async fn transcribe_at(&self, samples: &[i16], rate: u32) -> Result<Transcript> {
        if samples.is_empty() {
            return Err(Error::Stt("no audio to transcribe".to_string()));
        }

        let config = self.client.config();

        let stats = AudioStats::measure(samples);
        tracing::info!(
            samples = samples.len(),
            rms = stats.rms,
            mean = stats.mean,
            min = stats.min,
            max = stats.max,
            "transcribing capture"
        );
        if stats.is_silence() {
            tracing::warn!(rms = stats.rms, "capture looks like silence, STT may fail");
        }

        let wav = pcm16_to_wav(samples, rate)?;
        let payload = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: rate,
                language_code: &config.voice.language,
            },
            audio: RecognitionAudio {
                content: STANDARD.encode(&wav),
            },
        };

        let url = self.client.keyed_url(&config.api.stt_endpoint)?;
        let request = HttpRequest::post_json(url, &payload)?;
        let body = self
            .client
            .post_buffered(request, config.memory.stt_response_buffer)
            .await?;

        parse_recognition(body.as_slice())
    }
}

fn parse_recognition(body: &[u8]) -> Result<Transcript> {
    let response: RecognizeResponse = serde_json::from_slice(body)?;

    if let Some(error) = response.error {
        tracing::error!(code = ?error.code, message = %error.message, "STT API error");
        return Err(Error::Stt(error.message));
    }

    // Only an empty list means silence; a missing one is a malformed reply
    let Some(results) = response.results else {
        tracing::error!("no results field in STT response");
        return Err(Error::Stt("response has no results".to_string()));
    };
    let Some(result) = results.into_iter().next() else {
        tracing::warn!("STT returned no results, audio may be silence or unrecognized");
        return Ok(Transcript::NoSpeech);
    };
    let Some(alternatives) = result.alternatives else {
        return Err(Error::Stt("result has no alternatives".to_string()));
    };
    let Some(best) = alternatives.into_iter().next() else {
        tracing::warn!("STT result has no alternatives");
        return Ok(Transcript::NoSpeech);
    };
    let Some(text) = best.transcript else {
        return Err(Error::Stt("alternative without transcript".to_string()));
    };

    let text = text.trim();
    if text.is_empty() {
        return Ok(Transcript::NoSpeech);
    }

    tracing::info!(confidence = ?best.confidence, transcript = %text, "transcribed");
    Ok(Transcript::Speech(text.to_string()))
}
