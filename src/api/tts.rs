//! Text-to-speech (TTS) via Google Cloud Text-to-Speech

use serde::{Deserialize, Serialize};

use super::CloudClient;
use crate::codec::Base64Decoder;
use crate::sink::AudioSink;
use crate::stream::StreamOutcome;
use crate::transport::HttpRequest;
use crate::{Error, Result};

#[derive(Serialize)]
struct SynthesisInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection<'a> {
    language_code: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfig {
    audio_encoding: &'static str,
    sample_rate_hertz: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest<'a> {
    input: SynthesisInput<'a>,
    voice: VoiceSelection<'a>,
    audio_config: AudioConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: Option<String>,
}

/// Synthesizes speech as 16-bit `LINEAR16` audio
#[derive(Debug, Clone)]
pub struct TextToSpeech {
    client: CloudClient,
}

impl TextToSpeech {
    #[must_use]
    pub const fn new(client: CloudClient) -> Self {
        Self { client }
    }

    fn request(&self, text: &str) -> Result<HttpRequest> {
        if text.trim().is_empty() {
            return Err(Error::Tts("nothing to synthesize".to_string()));
        }

        let config = self.client.config();
        tracing::info!(
            voice = %config.voice.tts_voice,
            text_chars = text.chars().count(),
            "synthesizing speech"
        );

        let payload = SynthesizeRequest {
            input: SynthesisInput { text },
            voice: VoiceSelection {
                language_code: &config.voice.language,
                name: &config.voice.tts_voice,
            },
            audio_config: AudioConfig {
                audio_encoding: "LINEAR16",
                sample_rate_hertz: config.voice.playback_sample_rate,
            },
        };

        let url = self.client.keyed_url(&config.api.tts_endpoint)?;
        HttpRequest::post_json(url, &payload)
    }

    /// Synthesize `text` and return the decoded audio in one piece
    ///
    /// The whole response must fit the buffered TTS tier.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails, the response is larger than the
    /// granted buffer, or the audio field is missing or not valid base64
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        let request = self.request(text)?;
        let body = self
            .client
            .post_buffered(request, self.client.config().memory.tts_response_buffer)
            .await?;

        let response: SynthesizeResponse = serde_json::from_slice(body.as_slice())?;
        let Some(content) = response.audio_content else {
            return Err(Error::Tts("response has no audio content".to_string()));
        };

        let mut audio = Vec::with_capacity(content.len() / 4 * 3);
        let mut decoder = Base64Decoder::new();
        decoder.feed(content.as_bytes(), &mut audio)?;
        audio.extend_from_slice(decoder.finish()?.as_slice());

        tracing::info!(bytes = audio.len(), samples = audio.len() / 2, "speech synthesized");
        Ok(audio)
    }

    /// Synthesize `text`, handing decoded audio to `sink` as it arrives
    ///
    /// # Errors
    ///
    /// See [`crate::stream::StreamingRequest::run`]
    pub async fn synthesize_streaming<S>(&self, text: &str, sink: &mut S) -> Result<StreamOutcome>
    where
        S: AudioSink + ?Sized,
    {
        let request = self.request(text)?;
        let field = self.client.config().voice.audio_field.clone();
        self.client.post_streaming(request, &field, sink).await
    }
}
