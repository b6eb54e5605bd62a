//! Transcription capability interface.
//!
//! One production adapter (OpenAI-style diarized endpoint) and one
//! deterministic fake for tests. The pipeline depends only on the trait and
//! the segment shape, never on a provider's wire format.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::AudioChunk;
use crate::error::PipelineResult;

pub mod merger;
mod openai;

pub use merger::{merge_chunks, ChunkResult, MergedTranscript};
pub use openai::OpenAiTranscriber;

/// A timed span of text attributed to one speaker label.
///
/// Labels are provider-assigned positional identifiers ("Speaker 0"), not
/// verified identities; users map them to names per meeting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerSegment {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Transcription output for one chunk, with chunk-local timestamps.
#[derive(Debug, Clone, Default)]
pub struct ChunkTranscript {
    pub text: String,
    pub segments: Vec<SpeakerSegment>,
}

/// Capability interface over a speech-to-text provider.
///
/// `transcribe` must be idempotent for identical input bytes; retry policy
/// lives outside the adapter (see `pipeline::retry`), the adapter only
/// classifies its failures.
#[async_trait]
pub trait TranscriptionAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Upload size ceiling in bytes, so the chunk planner can honor it.
    fn max_upload_bytes(&self) -> u64;

    async fn transcribe(&self, chunk: &AudioChunk) -> PipelineResult<ChunkTranscript>;
}

/// Deterministic test double: returns scripted segments per chunk index, with
/// optional failure injection.
pub struct FakeTranscriber {
    script: Vec<Vec<SpeakerSegment>>,
    transient_failures: std::sync::atomic::AtomicU32,
    permanent_failure: Option<String>,
    max_upload_bytes: u64,
    pub calls: std::sync::atomic::AtomicU32,
}

impl FakeTranscriber {
    pub fn new(script: Vec<Vec<SpeakerSegment>>) -> Self {
        Self {
            script,
            transient_failures: std::sync::atomic::AtomicU32::new(0),
            permanent_failure: None,
            max_upload_bytes: 25 * 1024 * 1024,
            calls: std::sync::atomic::AtomicU32::new(0),
        }
    }

    /// Fail the first `n` calls with a transient error before succeeding.
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.transient_failures
            .store(n, std::sync::atomic::Ordering::SeqCst);
        self
    }

    /// Fail every call with a permanent error.
    pub fn with_permanent_failure(mut self, message: impl Into<String>) -> Self {
        self.permanent_failure = Some(message.into());
        self
    }
}

#[async_trait]
impl TranscriptionAdapter for FakeTranscriber {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    async fn transcribe(&self, chunk: &AudioChunk) -> PipelineResult<ChunkTranscript> {
        use std::sync::atomic::Ordering;
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = &self.permanent_failure {
            return Err(crate::error::PipelineError::permanent(message.clone()));
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(crate::error::PipelineError::transient(
                "injected transient failure",
            ));
        }

        let segments = self
            .script
            .get(chunk.index)
            .cloned()
            .unwrap_or_default();
        let text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(ChunkTranscript { text, segments })
    }
}

#[cfg(test)]
pub(crate) fn seg(speaker: &str, start: f64, end: f64, text: &str) -> SpeakerSegment {
    SpeakerSegment {
        speaker: speaker.to_string(),
        start,
        end,
        text: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chunk(index: usize) -> AudioChunk {
        AudioChunk {
            path: PathBuf::from("/tmp/chunk.mp3"),
            index,
            start_offset: 0.0,
            duration: 10.0,
            size_bytes: 100,
        }
    }

    #[tokio::test]
    async fn test_fake_returns_scripted_segments() {
        let fake = FakeTranscriber::new(vec![
            vec![seg("Speaker 0", 0.0, 2.0, "hello")],
            vec![seg("Speaker 1", 0.0, 3.0, "world")],
        ]);

        let first = fake.transcribe(&chunk(0)).await.unwrap();
        assert_eq!(first.segments[0].speaker, "Speaker 0");
        assert_eq!(first.text, "hello");

        let second = fake.transcribe(&chunk(1)).await.unwrap();
        assert_eq!(second.segments[0].speaker, "Speaker 1");
    }

    #[tokio::test]
    async fn test_fake_transient_failures_then_success() {
        let fake = FakeTranscriber::new(vec![vec![seg("Speaker 0", 0.0, 1.0, "ok")]])
            .with_transient_failures(2);

        assert!(fake.transcribe(&chunk(0)).await.is_err());
        assert!(fake.transcribe(&chunk(0)).await.is_err());
        assert!(fake.transcribe(&chunk(0)).await.is_ok());
    }

    #[tokio::test]
    async fn test_fake_is_idempotent_for_same_chunk() {
        let fake = FakeTranscriber::new(vec![vec![seg("Speaker 0", 0.0, 1.0, "same")]]);
        let a = fake.transcribe(&chunk(0)).await.unwrap();
        let b = fake.transcribe(&chunk(0)).await.unwrap();
        assert_eq!(a.segments, b.segments);
    }
}
