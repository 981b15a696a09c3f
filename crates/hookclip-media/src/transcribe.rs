//! Speech-to-text through the whisper transcription script.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use hookclip_models::Transcript;
use serde::Deserialize;
use tokio::sync::watch;
use tracing::info;

use crate::command::ToolRunner;
use crate::error::{MediaError, MediaResult};

/// Transcription options.
#[derive(Debug, Clone, Default)]
pub struct TranscribeOptions {
    /// Language code; auto-detected when `None`
    pub language: Option<String>,
    pub word_timestamps: bool,
}

/// Produces a timed transcript for a media file.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        source: &Path,
        options: &TranscribeOptions,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<Transcript>;
}

/// Whisper script settings.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub python_path: String,
    pub script_path: PathBuf,
    /// Model size (tiny, base, small, medium, large-v3)
    pub model: String,
    /// cpu or cuda
    pub device: String,
    pub timeout_secs: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            python_path: "python3".to_string(),
            script_path: PathBuf::from("./scripts/transcribe.py"),
            model: "small".to_string(),
            device: "cpu".to_string(),
            timeout_secs: 600,
        }
    }
}

impl WhisperConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let scripts_dir = std::env::var("SCRIPTS_DIR").unwrap_or_else(|_| "./scripts".to_string());
        Self {
            python_path: std::env::var("PYTHON_PATH").unwrap_or_else(|_| "python3".to_string()),
            script_path: Path::new(&scripts_dir).join("transcribe.py"),
            model: std::env::var("WHISPER_MODEL").unwrap_or_else(|_| "small".to_string()),
            device: std::env::var("WHISPER_DEVICE").unwrap_or_else(|_| "cpu".to_string()),
            timeout_secs: std::env::var("TRANSCRIBE_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(600),
        }
    }
}

/// Script output: a transcript, or an error object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptOutput {
    Failure { error: String },
    Success(Transcript),
}

/// [`Transcriber`] that shells out to `transcribe.py` (faster-whisper).
#[derive(Debug, Clone, Default)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
}

impl WhisperTranscriber {
    pub fn new(config: WhisperConfig) -> Self {
        Self { config }
    }

    pub fn build_args(&self, source: &Path, options: &TranscribeOptions) -> Vec<String> {
        let mut args = vec![
            self.config.script_path.to_string_lossy().to_string(),
            source.to_string_lossy().to_string(),
            "--model".to_string(),
            self.config.model.clone(),
            "--device".to_string(),
            self.config.device.clone(),
        ];
        if let Some(language) = &options.language {
            args.push("--language".to_string());
            args.push(language.clone());
        }
        if options.word_timestamps {
            args.push("--word-timestamps".to_string());
        }
        args
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        source: &Path,
        options: &TranscribeOptions,
        cancel: Option<watch::Receiver<bool>>,
    ) -> MediaResult<Transcript> {
        info!(
            "Transcribing {} (model={}, device={})",
            source.display(),
            self.config.model,
            self.config.device
        );

        let output = ToolRunner::new()
            .with_cancel_opt(cancel)
            .with_timeout_secs(self.config.timeout_secs)
            .run(&self.config.python_path, &self.build_args(source, options))
            .await?;

        let transcript = parse_transcript(&output.stdout)?;
        info!(
            "Transcription complete: {} segments, duration={:.1}s",
            transcript.segments.len(),
            transcript.duration
        );
        Ok(transcript)
    }
}

/// Parse the script's JSON output.
pub fn parse_transcript(json: &str) -> MediaResult<Transcript> {
    match serde_json::from_str::<ScriptOutput>(json.trim()) {
        Ok(ScriptOutput::Success(transcript)) => Ok(transcript),
        Ok(ScriptOutput::Failure { error }) => Err(MediaError::TranscriptionFailed(error)),
        Err(e) => Err(MediaError::malformed("transcribe.py", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args() {
        let transcriber = WhisperTranscriber::default();
        let args = transcriber.build_args(
            Path::new("/d/a.mp4"),
            &TranscribeOptions {
                language: Some("en".into()),
                word_timestamps: true,
            },
        );
        assert_eq!(args[1], "/d/a.mp4");
        assert!(args.windows(2).any(|w| w == ["--model", "small"]));
        assert!(args.windows(2).any(|w| w == ["--language", "en"]));
        assert_eq!(args.last().unwrap(), "--word-timestamps");
    }

    #[test]
    fn test_parse_transcript() {
        let json = r#"{
            "language": "en", "language_probability": 0.98, "duration": 12.5,
            "segments": [{
                "id": 0, "start": 0.0, "end": 2.4, "text": "Hello world",
                "avg_logprob": -0.2, "no_speech_prob": 0.01,
                "words": [
                    {"word": "Hello", "start": 0.0, "end": 0.5, "probability": 0.9},
                    {"word": "world", "start": 0.6, "end": 1.1, "probability": 0.8}
                ]
            }]
        }"#;
        let transcript = parse_transcript(json).unwrap();
        assert_eq!(transcript.language, "en");
        assert_eq!(transcript.segments[0].words.len(), 2);
    }

    #[test]
    fn test_parse_script_error() {
        let err = parse_transcript(r#"{"error": "model not found"}"#).unwrap_err();
        assert!(matches!(err, MediaError::TranscriptionFailed(msg) if msg == "model not found"));

        assert!(matches!(
            parse_transcript("garbage"),
            Err(MediaError::MalformedOutput { .. })
        ));
    }
}
