//! Shared test utilities
#![allow(dead_code)]

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use somnus_cloud::transport::ScriptedTransport;
use somnus_cloud::{CloudClient, Config, NetworkGate};

/// Config with a dummy key and unbounded pools
#[must_use]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.api.api_key = Some("test-key".to_string());
    config
}

/// Client replaying `transport` through a fresh gate
#[must_use]
pub fn test_client(transport: &ScriptedTransport, config: Config) -> CloudClient {
    CloudClient::with_transport(config, Arc::new(transport.clone()), NetworkGate::new())
}

/// Synthesis response body in the pretty-printed layout the service returns
#[must_use]
pub fn tts_body(audio: &[u8]) -> String {
    format!(
        "{{\n  \"audioContent\": \"{}\",\n  \"timepoints\": []\n}}\n",
        STANDARD.encode(audio)
    )
}

/// Recognition response with a single transcript
#[must_use]
pub fn stt_body(transcript: &str) -> String {
    serde_json::json!({
        "results": [{"alternatives": [{"transcript": transcript, "confidence": 0.92}]}]
    })
    .to_string()
}

/// Generation response with a text reply
#[must_use]
pub fn llm_text_body(text: &str) -> String {
    serde_json::json!({
        "candidates": [{
            "content": {"parts": [{"text": text}], "role": "model"},
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

/// One second of a 440 Hz tone as 16-bit samples
#[must_use]
pub fn tone(sample_rate: u32) -> Vec<i16> {
    (0..sample_rate)
        .map(|i| {
            let t = f64::from(i) / f64::from(sample_rate);
            #[allow(clippy::cast_possible_truncation)]
            let sample = (8000.0 * (2.0 * std::f64::consts::PI * 440.0 * t).sin()) as i16;
            sample
        })
        .collect()
}
