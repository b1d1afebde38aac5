//! Text generation via Gemini `generateContent`

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::CloudClient;
use crate::transport::HttpRequest;
use crate::{Error, Result};

/// What the model answered
#[derive(Debug, Clone, PartialEq)]
pub enum LlmReply {
    Text(String),
    /// The model asked for one of the declared functions to be run
    FunctionCall { name: String, args: Value },
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Gemini client
#[derive(Debug, Clone)]
pub struct LanguageModel {
    client: CloudClient,
}

impl LanguageModel {
    #[must_use]
    pub const fn new(client: CloudClient) -> Self {
        Self { client }
    }

    /// Generate a plain text reply
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply carries no text
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        match self.request(prompt, None).await? {
            LlmReply::Text(text) => Ok(text),
            LlmReply::FunctionCall { name, .. } => Err(Error::Llm(format!(
                "unexpected function call `{name}` without declared tools"
            ))),
        }
    }

    /// Generate a reply, letting the model call one of `tools`
    ///
    /// `tools` is the `tools` array of a `generateContent` request
    /// (function declarations).
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the reply has neither text nor
    /// a function call
    pub async fn generate_with_tools(&self, prompt: &str, tools: &Value) -> Result<LlmReply> {
        self.request(prompt, Some(tools)).await
    }

    async fn request(&self, prompt: &str, tools: Option<&Value>) -> Result<LlmReply> {
        if prompt.trim().is_empty() {
            return Err(Error::Llm("empty prompt".to_string()));
        }

        let config = self.client.config();
        tracing::info!(
            model = %config.api.llm_model,
            prompt_chars = prompt.chars().count(),
            with_tools = tools.is_some(),
            "generating reply"
        );

        let endpoint = format!(
            "{}/{}:generateContent",
            config.api.llm_endpoint.trim_end_matches('/'),
            config.api.llm_model
        );
        let payload = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            tools,
        };

        let url = self.client.keyed_url(&endpoint)?;
        let request = HttpRequest::post_json(url, &payload)?;
        let body = self
            .client
            .post_buffered(request, config.memory.llm_response_buffer)
            .await?;

        parse_reply(body.as_slice())
    }
}

fn parse_reply(body: &[u8]) -> Result<LlmReply> {
    let response: GenerateResponse = serde_json::from_slice(body)?;

    if let Some(error) = response.error {
        return Err(Error::Llm(error.message));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(Error::Llm("no candidates in response".to_string()));
    };
    let finish_reason = candidate.finish_reason;
    let Some(part) = candidate
        .content
        .and_then(|content| content.parts.into_iter().next())
    else {
        return Err(Error::Llm(format!(
            "candidate has no content (finish reason {})",
            finish_reason.as_deref().unwrap_or("unknown")
        )));
    };

    if let Some(call) = part.function_call {
        tracing::info!(function = %call.name, "model requested function call");
        return Ok(LlmReply::FunctionCall {
            name: call.name,
            args: call.args,
        });
    }

    match part.text {
        Some(text) => {
            tracing::info!(reply_chars = text.chars().count(), "generated reply");
            Ok(LlmReply::Text(text))
        }
        None => Err(Error::Llm("first part has neither text nor function call".to_string())),
    }
}
