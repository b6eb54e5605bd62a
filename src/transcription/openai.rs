//! Production transcription adapter for an OpenAI-style diarized
//! speech-to-text endpoint.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use super::{ChunkTranscript, SpeakerSegment, TranscriptionAdapter};
use crate::audio::AudioChunk;
use crate::config::TranscriptionProviderConfig;
use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    segments: Vec<ResponseSegment>,
}

#[derive(Debug, Deserialize)]
struct ResponseSegment {
    #[serde(default)]
    speaker: String,
    start: f64,
    end: f64,
    text: String,
}

pub struct OpenAiTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: String,
    max_upload_bytes: u64,
}

impl OpenAiTranscriber {
    pub fn new(config: &TranscriptionProviderConfig, timeout: Duration) -> PipelineResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PipelineError::Internal(anyhow::anyhow!(
                "providers.transcription.api_key is not configured"
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Internal(e.into()))?;

        info!(
            "Initialized transcription provider: {} via {}",
            config.model, config.base_url
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
            max_upload_bytes: config.max_upload_mb * 1024 * 1024,
        })
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("ogg") => "audio/ogg",
        Some("opus") => "audio/opus",
        Some("webm") => "video/webm",
        Some("mp4") => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl TranscriptionAdapter for OpenAiTranscriber {
    fn name(&self) -> &'static str {
        "openai-diarized"
    }

    fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    async fn transcribe(&self, chunk: &AudioChunk) -> PipelineResult<ChunkTranscript> {
        debug!(
            "Transcribing chunk {} ({} bytes, offset {:.1}s)",
            chunk.index, chunk.size_bytes, chunk.start_offset
        );

        let file_data = fs::read(&chunk.path).await.map_err(|e| {
            PipelineError::permanent(format!("Failed to read audio chunk {:?}: {e}", chunk.path))
        })?;

        let filename = chunk
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio")
            .to_string();

        let form = Form::new()
            .part(
                "file",
                Part::bytes(file_data)
                    .file_name(filename)
                    .mime_str(mime_for(&chunk.path))
                    .map_err(|e| PipelineError::Internal(e.into()))?,
            )
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .text("response_format", "diarized_json")
            .text("chunking_strategy", "auto");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest("transcription provider", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::from_reqwest("transcription provider", e))?;

        if !status.is_success() {
            return Err(PipelineError::from_status(
                "transcription provider",
                status,
                &body,
            ));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body).map_err(|e| {
            PipelineError::Internal(anyhow::anyhow!(
                "Failed to parse transcription response: {e}"
            ))
        })?;

        let segments = parsed
            .segments
            .into_iter()
            .map(|s| SpeakerSegment {
                speaker: s.speaker,
                start: s.start,
                end: s.end,
                text: s.text,
            })
            .collect::<Vec<_>>();

        info!(
            "Chunk {} transcribed: {} chars, {} segments",
            chunk.index,
            parsed.text.len(),
            segments.len()
        );

        Ok(ChunkTranscript {
            text: parsed.text.trim().to_string(),
            segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_table() {
        assert_eq!(mime_for(Path::new("a.mp3")), "audio/mpeg");
        assert_eq!(mime_for(Path::new("a.webm")), "video/webm");
        assert_eq!(mime_for(Path::new("a.xyz")), "application/octet-stream");
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{
            "text": "hello there",
            "segments": [
                {"speaker": "Speaker 0", "start": 0.0, "end": 1.2, "text": "hello"},
                {"speaker": "Speaker 1", "start": 1.4, "end": 2.0, "text": "there"}
            ]
        }"#;
        let parsed: TranscriptionResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[1].speaker, "Speaker 1");
    }

    #[test]
    fn test_response_without_segments() {
        let parsed: TranscriptionResponse = serde_json::from_str(r#"{"text": "x"}"#).unwrap();
        assert!(parsed.segments.is_empty());
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = TranscriptionProviderConfig::default();
        assert!(OpenAiTranscriber::new(&config, Duration::from_secs(30)).is_err());
    }
}
