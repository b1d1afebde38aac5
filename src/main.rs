use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use somnus_cloud::codec::wav_to_pcm16;
use somnus_cloud::{
    AssistantTurn, AudioSink, CloudClient, Config, LanguageModel, LlmReply, SpeechToText,
    StreamStatus, TextToSpeech, Transcript, VoiceAssistant, WavSink,
};

/// Somnus - cloud speech tools for the Somnus voice device
#[derive(Parser)]
#[command(name = "somnus", version, about)]
struct Cli {
    /// Config file (default: ~/.config/somnus/cloud.toml)
    #[arg(short, long, env = "SOMNUS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synthesize speech into a WAV file
    Tts {
        /// Text to speak
        text: String,
        /// Output WAV file
        #[arg(short, long, default_value = "speech.wav")]
        out: PathBuf,
        /// Read the whole response before decoding instead of streaming
        #[arg(long)]
        buffered: bool,
    },
    /// Transcribe a 16-bit mono WAV file
    Transcribe {
        /// Input WAV file
        input: PathBuf,
    },
    /// Ask the language model a question
    Ask {
        /// Prompt text
        prompt: String,
        /// JSON file with a `tools` array of function declarations
        #[arg(long)]
        tools: Option<PathBuf>,
    },
    /// Run a full voice command: transcribe, answer, speak
    Assist {
        /// Captured command as a 16-bit mono WAV file
        input: PathBuf,
        /// Output WAV file for the spoken reply
        #[arg(short, long, default_value = "reply.wav")]
        out: PathBuf,
        /// JSON file with a `tools` array of function declarations
        #[arg(long)]
        tools: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,somnus_cloud=info",
        1 => "info,somnus_cloud=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(?config, "loaded configuration");

    let client = CloudClient::new(config)?;

    match cli.command {
        Command::Tts {
            text,
            out,
            buffered,
        } => tts(&client, &text, &out, buffered).await,
        Command::Transcribe { input } => transcribe(&client, &input).await,
        Command::Ask { prompt, tools } => ask(&client, &prompt, tools.as_deref()).await,
        Command::Assist { input, out, tools } => {
            assist(&client, &input, &out, tools.as_deref()).await
        }
    }
}

async fn tts(client: &CloudClient, text: &str, out: &Path, buffered: bool) -> anyhow::Result<()> {
    let tts = TextToSpeech::new(client.clone());
    let mut sink = WavSink::create(out, client.config().voice.playback_sample_rate)?;

    if buffered {
        let audio = tts.synthesize(text).await?;
        sink.deliver(&audio);
    } else {
        let outcome = tts.synthesize_streaming(text, &mut sink).await?;
        if outcome.status == StreamStatus::Stopped {
            tracing::warn!("playback sink stopped the stream early");
        }
    }

    let samples = sink.finish()?;
    println!("wrote {samples} samples to {}", out.display());
    Ok(())
}

async fn transcribe(client: &CloudClient, input: &Path) -> anyhow::Result<()> {
    let (samples, rate) = read_capture(input)?;
    let stt = SpeechToText::new(client.clone());

    match stt.transcribe_at(&samples, rate).await? {
        Transcript::Speech(text) => println!("{text}"),
        Transcript::NoSpeech => println!("(no speech detected)"),
    }
    Ok(())
}

async fn ask(client: &CloudClient, prompt: &str, tools: Option<&Path>) -> anyhow::Result<()> {
    let llm = LanguageModel::new(client.clone());

    let reply = match tools {
        Some(path) => llm.generate_with_tools(prompt, &read_tools(path)?).await?,
        None => LlmReply::Text(llm.generate(prompt).await?),
    };

    match reply {
        LlmReply::Text(text) => println!("{text}"),
        LlmReply::FunctionCall { name, args } => println!("call {name}({args})"),
    }
    Ok(())
}

async fn assist(
    client: &CloudClient,
    input: &Path,
    out: &Path,
    tools: Option<&Path>,
) -> anyhow::Result<()> {
    let (samples, rate) = read_capture(input)?;
    let expected = client.config().voice.capture_sample_rate;
    if rate != expected {
        tracing::warn!(
            file_rate = rate,
            expected,
            "capture rate differs from configured rate"
        );
    }

    let mut assistant = VoiceAssistant::new(client);
    if let Some(path) = tools {
        assistant = assistant.with_tools(read_tools(path)?);
    }

    let mut sink = WavSink::create(out, client.config().voice.playback_sample_rate)?;
    let turn = assistant.handle_command(&samples, &mut sink).await?;
    let written = sink.finish()?;

    match turn {
        AssistantTurn::NoSpeech => println!("(no speech detected)"),
        AssistantTurn::FunctionCall {
            transcript,
            name,
            args,
        } => {
            println!("heard: {transcript}");
            println!("call {name}({args})");
        }
        AssistantTurn::Spoke {
            transcript, reply, ..
        } => {
            println!("heard: {transcript}");
            println!("reply: {reply}");
            println!("wrote {written} samples to {}", out.display());
        }
    }
    Ok(())
}

fn read_capture(path: &Path) -> anyhow::Result<(Vec<i16>, u32)> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(wav_to_pcm16(&bytes)?)
}

fn read_tools(path: &Path) -> anyhow::Result<serde_json::Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    Ok(value)
}
