//! TOML configuration file loading
//!
//! Supports `~/.config/somnus/cloud.toml` as a persistent config source.
//! Every field is optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudConfigFile {
    #[serde(default)]
    pub api: ApiFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub gate: GateFileConfig,

    #[serde(default)]
    pub memory: MemoryFileConfig,

    #[serde(default)]
    pub http: HttpFileConfig,
}

/// Credentials, models and endpoints
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiFileConfig {
    /// Google API key shared by all three services
    pub key: Option<String>,

    /// Gemini model (e.g. "gemini-2.0-flash")
    pub llm_model: Option<String>,

    pub stt_endpoint: Option<String>,
    pub llm_endpoint: Option<String>,
    pub tts_endpoint: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoiceFileConfig {
    /// BCP-47 language code (e.g. "en-US")
    pub language: Option<String>,

    /// Synthesis voice (e.g. "en-US-Neural2-D")
    pub tts_voice: Option<String>,

    pub capture_sample_rate: Option<u32>,
    pub playback_sample_rate: Option<u32>,

    /// JSON field carrying synthesized audio
    pub audio_field: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateFileConfig {
    pub acquire_timeout_ms: Option<u64>,
}

/// Buffer sizes and pool budgets, in bytes
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryFileConfig {
    pub psram_budget: Option<usize>,
    pub internal_budget: Option<usize>,
    pub heap_budget: Option<usize>,
    pub stream_buffer: Option<usize>,
    pub fallback_buffer: Option<usize>,
    pub minimum_buffer: Option<usize>,
    pub llm_response_buffer: Option<usize>,
    pub stt_response_buffer: Option<usize>,
    pub tts_response_buffer: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpFileConfig {
    pub request_timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `CloudConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> CloudConfigFile {
    let Some(path) = config_file_path() else {
        return CloudConfigFile::default();
    };

    if !path.exists() {
        return CloudConfigFile::default();
    }

    match read_config_file(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            CloudConfigFile::default()
        }
    }
}

/// Read and parse a config file the caller asked for explicitly
///
/// # Errors
///
/// Returns error if the file cannot be read or is not valid TOML
pub fn read_config_file(path: &Path) -> Result<CloudConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error on invalid TOML or unknown keys
pub fn parse_config(content: &str) -> Result<CloudConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path: `~/.config/somnus/cloud.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("somnus").join("cloud.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial_file() {
        let file = parse_config(
            r#"
            [api]
            key = "abc"

            [memory]
            psram_budget = 65536
            "#,
        )
        .unwrap();

        assert_eq!(file.api.key.as_deref(), Some("abc"));
        assert_eq!(file.memory.psram_budget, Some(65536));
        assert!(file.voice.language.is_none());
        assert!(file.gate.acquire_timeout_ms.is_none());
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(parse_config("[gate]\ntimeout = 3\n").is_err());
    }

    #[test]
    fn reads_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.toml");
        std::fs::write(&path, "[voice]\ntts_voice = \"en-GB-Neural2-B\"\n").unwrap();

        let file = read_config_file(&path).unwrap();
        assert_eq!(file.voice.tts_voice.as_deref(), Some("en-GB-Neural2-B"));
        assert!(read_config_file(&dir.path().join("missing.toml")).is_err());
    }
}
