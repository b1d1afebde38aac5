//! Configuration for the cloud clients
//!
//! Precedence is env > TOML file > defaults. Environment lookups go through a
//! closure so the layering can be exercised without touching the process
//! environment.

pub mod file;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

use self::file::CloudConfigFile;

const KB: usize = 1024;

/// Client configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api: ApiConfig,
    pub voice: VoiceConfig,
    pub gate: GateConfig,
    pub memory: MemoryConfig,
    pub http: HttpConfig,
}

/// Credentials, model and service endpoints
#[derive(Clone)]
pub struct ApiConfig {
    /// Google API key, sent as the `key` query parameter
    pub api_key: Option<String>,
    pub llm_model: String,
    pub stt_endpoint: String,
    /// Base of `{base}/{model}:generateContent`
    pub llm_endpoint: String,
    pub tts_endpoint: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            llm_model: "gemini-2.0-flash".to_string(),
            stt_endpoint: "https://speech.googleapis.com/v1/speech:recognize".to_string(),
            llm_endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            tts_endpoint: "https://texttospeech.googleapis.com/v1/text:synthesize".to_string(),
        }
    }
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_model", &self.llm_model)
            .field("stt_endpoint", &self.stt_endpoint)
            .field("llm_endpoint", &self.llm_endpoint)
            .field("tts_endpoint", &self.tts_endpoint)
            .finish()
    }
}

/// Voice settings
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub language: String,
    pub tts_voice: String,
    /// Microphone rate uploaded for recognition
    pub capture_sample_rate: u32,
    /// Rate requested from synthesis
    pub playback_sample_rate: u32,
    /// JSON field holding base64 audio in synthesis responses
    pub audio_field: String,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            tts_voice: "en-US-Neural2-D".to_string(),
            capture_sample_rate: 16_000,
            playback_sample_rate: 24_000,
            audio_field: "audioContent".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Longest wait for the network gate
    pub acquire_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(10),
        }
    }
}

/// Response buffer sizes and memory pool budgets
///
/// A `None` budget means the pool is the unbounded system heap.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub psram_budget: Option<usize>,
    pub internal_budget: Option<usize>,
    pub heap_budget: Option<usize>,
    /// Preferred staging buffer for streamed audio
    pub stream_buffer: usize,
    pub fallback_buffer: usize,
    pub minimum_buffer: usize,
    pub llm_response_buffer: usize,
    pub stt_response_buffer: usize,
    pub tts_response_buffer: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            psram_budget: None,
            internal_budget: None,
            heap_budget: None,
            stream_buffer: 192 * KB,
            fallback_buffer: 32 * KB,
            minimum_buffer: 24 * KB,
            llm_response_buffer: 96 * KB,
            stt_response_buffer: 96 * KB,
            tts_response_buffer: 192 * KB,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load from the process environment and a TOML file
    ///
    /// `path` replaces the standard `~/.config/somnus/cloud.toml`; an explicit
    /// path must exist and parse, the standard one is optional.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit file is unreadable, an env override does
    /// not parse, or validation fails
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = match path {
            Some(path) => file::read_config_file(path)?,
            None => file::load_config_file(),
        };
        let config = Self::from_sources(fc, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Layer `env` over `fc` over defaults
    ///
    /// # Errors
    ///
    /// Returns error if a numeric env override does not parse
    pub fn from_sources<E>(fc: CloudConfigFile, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api = ApiConfig {
            api_key: env("GEMINI_API_KEY").or(fc.api.key),
            llm_model: env("SOMNUS_LLM_MODEL")
                .or(fc.api.llm_model)
                .unwrap_or(defaults.api.llm_model),
            stt_endpoint: fc.api.stt_endpoint.unwrap_or(defaults.api.stt_endpoint),
            llm_endpoint: fc.api.llm_endpoint.unwrap_or(defaults.api.llm_endpoint),
            tts_endpoint: fc.api.tts_endpoint.unwrap_or(defaults.api.tts_endpoint),
        };

        let voice = VoiceConfig {
            language: env("SOMNUS_LANGUAGE")
                .or(fc.voice.language)
                .unwrap_or(defaults.voice.language),
            tts_voice: env("SOMNUS_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or(defaults.voice.tts_voice),
            capture_sample_rate: fc
                .voice
                .capture_sample_rate
                .unwrap_or(defaults.voice.capture_sample_rate),
            playback_sample_rate: fc
                .voice
                .playback_sample_rate
                .unwrap_or(defaults.voice.playback_sample_rate),
            audio_field: fc.voice.audio_field.unwrap_or(defaults.voice.audio_field),
        };

        let gate = GateConfig {
            acquire_timeout: parse_env(&env, "SOMNUS_GATE_TIMEOUT_MS")?
                .or(fc.gate.acquire_timeout_ms)
                .map_or(defaults.gate.acquire_timeout, Duration::from_millis),
        };

        let m = fc.memory;
        let d = defaults.memory;
        let memory = MemoryConfig {
            psram_budget: m.psram_budget,
            internal_budget: m.internal_budget,
            heap_budget: m.heap_budget,
            stream_buffer: m.stream_buffer.unwrap_or(d.stream_buffer),
            fallback_buffer: m.fallback_buffer.unwrap_or(d.fallback_buffer),
            minimum_buffer: m.minimum_buffer.unwrap_or(d.minimum_buffer),
            llm_response_buffer: m.llm_response_buffer.unwrap_or(d.llm_response_buffer),
            stt_response_buffer: m.stt_response_buffer.unwrap_or(d.stt_response_buffer),
            tts_response_buffer: m.tts_response_buffer.unwrap_or(d.tts_response_buffer),
        };

        let http = HttpConfig {
            request_timeout: parse_env(&env, "SOMNUS_HTTP_TIMEOUT_SECS")?
                .or(fc.http.request_timeout_secs)
                .map_or(defaults.http.request_timeout, Duration::from_secs),
        };

        Ok(Self {
            api,
            voice,
            gate,
            memory,
            http,
        })
    }

    /// Reject settings no request could work with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.gate.acquire_timeout.is_zero() {
            return Err(Error::Config("gate acquire timeout must be positive".to_string()));
        }

        let sizes = [
            ("stream_buffer", self.memory.stream_buffer),
            ("fallback_buffer", self.memory.fallback_buffer),
            ("minimum_buffer", self.memory.minimum_buffer),
            ("llm_response_buffer", self.memory.llm_response_buffer),
            ("stt_response_buffer", self.memory.stt_response_buffer),
            ("tts_response_buffer", self.memory.tts_response_buffer),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, size)| *size == 0) {
            return Err(Error::Config(format!("memory.{name} must be non-zero")));
        }

        if self.voice.audio_field.is_empty() {
            return Err(Error::Config("voice.audio_field must not be empty".to_string()));
        }
        if self.voice.capture_sample_rate == 0 || self.voice.playback_sample_rate == 0 {
            return Err(Error::Config("sample rates must be non-zero".to_string()));
        }

        Ok(())
    }

    /// The API key, required by every cloud call
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no key is configured
    pub fn api_key(&self) -> Result<&str> {
        self.api
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "Google API key required (set GEMINI_API_KEY or api.key)".to_string(),
                )
            })
    }
}

fn parse_env<E, T>(env: &E, key: &str) -> Result<Option<T>>
where
    E: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key}={raw}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_device() {
        let config = Config::from_sources(CloudConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.api.llm_model, "gemini-2.0-flash");
        assert_eq!(config.voice.tts_voice, "en-US-Neural2-D");
        assert_eq!(config.voice.audio_field, "audioContent");
        assert_eq!(config.gate.acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.memory.stream_buffer, 196_608);
        assert_eq!(config.memory.minimum_buffer, 24_576);
        assert!(config.validate().is_ok());
        assert!(config.api_key().is_err());
    }

    #[test]
    fn env_overrides_file() {
        let fc = file::parse_config(
            r#"
            [api]
            key = "from-file"
            llm_model = "gemini-1.5-pro"

            [gate]
            acquire_timeout_ms = 2500
            "#,
        )
        .unwrap();

        let config = Config::from_sources(
            fc,
            env_from(&[("GEMINI_API_KEY", "from-env"), ("SOMNUS_LANGUAGE", "de-DE")]),
        )
        .unwrap();

        assert_eq!(config.api_key().unwrap(), "from-env");
        assert_eq!(config.api.llm_model, "gemini-1.5-pro");
        assert_eq!(config.voice.language, "de-DE");
        assert_eq!(config.gate.acquire_timeout, Duration::from_millis(2500));
    }

    #[test]
    fn bad_numeric_env_is_config_error() {
        let err = Config::from_sources(
            CloudConfigFile::default(),
            env_from(&[("SOMNUS_GATE_TIMEOUT_MS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_rejects_zero_tier() {
        let fc = file::parse_config("[memory]\nminimum_buffer = 0\n").unwrap();
        let config = Config::from_sources(fc, env_from(&[])).unwrap();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("minimum_buffer"));
    }

    #[test]
    fn debug_hides_key() {
        let config = Config::from_sources(
            CloudConfigFile::default(),
            env_from(&[("GEMINI_API_KEY", "super-secret")]),
        )
        .unwrap();
        assert!(!format!("{config:?}").contains("super-secret"));
    }
}
