//! Voice command handling: transcribe, answer, speak

use serde_json::Value;

use crate::api::{CloudClient, LanguageModel, LlmReply, SpeechToText, TextToSpeech, Transcript};
use crate::sink::AudioSink;
use crate::stream::StreamOutcome;
use crate::Result;

/// How a voice command was handled
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantTurn {
    /// Nothing was recognized; no further requests were made
    NoSpeech,
    /// The reply was spoken into the sink
    Spoke {
        transcript: String,
        reply: String,
        outcome: StreamOutcome,
    },
    /// The model wants a device action run; nothing was spoken
    FunctionCall {
        transcript: String,
        name: String,
        args: Value,
    },
}

/// The device's command pipeline over one shared [`CloudClient`]
#[derive(Debug, Clone)]
pub struct VoiceAssistant {
    stt: SpeechToText,
    llm: LanguageModel,
    tts: TextToSpeech,
    tools: Option<Value>,
}

impl VoiceAssistant {
    #[must_use]
    pub fn new(client: &CloudClient) -> Self {
        Self {
            stt: SpeechToText::new(client.clone()),
            llm: LanguageModel::new(client.clone()),
            tts: TextToSpeech::new(client.clone()),
            tools: None,
        }
    }

    /// Declare functions the model may call (a `tools` array)
    #[must_use]
    pub fn with_tools(mut self, tools: Value) -> Self {
        self.tools = Some(tools);
        self
    }

    #[must_use]
    pub const fn tts(&self) -> &TextToSpeech {
        &self.tts
    }

    /// Handle one captured command
    ///
    /// Requests run one after another, each through the network gate.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error
    pub async fn handle_command<S>(&self, samples: &[i16], sink: &mut S) -> Result<AssistantTurn>
    where
        S: AudioSink + ?Sized,
    {
        let transcript = match self.stt.transcribe(samples).await? {
            Transcript::Speech(text) => text,
            Transcript::NoSpeech => {
                tracing::info!("no speech recognized, skipping reply");
                return Ok(AssistantTurn::NoSpeech);
            }
        };

        let reply = match &self.tools {
            Some(tools) => self.llm.generate_with_tools(&transcript, tools).await?,
            None => LlmReply::Text(self.llm.generate(&transcript).await?),
        };

        match reply {
            LlmReply::FunctionCall { name, args } => Ok(AssistantTurn::FunctionCall {
                transcript,
                name,
                args,
            }),
            LlmReply::Text(reply) => {
                let outcome = self.tts.synthesize_streaming(&reply, sink).await?;
                Ok(AssistantTurn::Spoke {
                    transcript,
                    reply,
                    outcome,
                })
            }
        }
    }
}
