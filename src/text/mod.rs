//! Text refinement and summarization capability interfaces.
//!
//! Both are narrow traits over an LLM provider: the refiner corrects the
//! speaker-attributed transcript without disturbing timing or speaker order,
//! the summarizer turns corrected text into a structured minutes document the
//! rest of the system treats as opaque.

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::transcription::SpeakerSegment;

mod openai;

pub use openai::{ChatCompletionClient, OpenAiRefiner, OpenAiSummarizer};

/// Corrects raw transcript segments.
///
/// The output keeps chronological and speaker order and may not introduce
/// speaker labels absent from the input; a provider reply that violates this
/// is discarded in favor of the input.
#[async_trait]
pub trait TextRefiner: Send + Sync {
    async fn refine(&self, segments: &[SpeakerSegment]) -> PipelineResult<Vec<SpeakerSegment>>;
}

/// Produces a structured summary document from corrected transcript text.
/// Required sections: attendees (from speaker labels), discussion topics,
/// decisions, action items with optional owners.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, corrected_text: &str) -> PipelineResult<String>;
}

/// Test double: applies a scripted text transform to each segment.
pub struct FakeRefiner {
    transform: fn(&str) -> String,
    fail_with: Option<crate::error::PipelineError>,
}

impl FakeRefiner {
    pub fn identity() -> Self {
        Self {
            transform: |text| text.to_string(),
            fail_with: None,
        }
    }

    pub fn uppercasing() -> Self {
        Self {
            transform: |text| text.to_uppercase(),
            fail_with: None,
        }
    }

    pub fn failing(err: crate::error::PipelineError) -> Self {
        Self {
            transform: |text| text.to_string(),
            fail_with: Some(err),
        }
    }
}

#[async_trait]
impl TextRefiner for FakeRefiner {
    async fn refine(&self, segments: &[SpeakerSegment]) -> PipelineResult<Vec<SpeakerSegment>> {
        if let Some(err) = &self.fail_with {
            return Err(clone_error(err));
        }
        Ok(segments
            .iter()
            .map(|s| SpeakerSegment {
                speaker: s.speaker.clone(),
                start: s.start,
                end: s.end,
                text: (self.transform)(&s.text),
            })
            .collect())
    }
}

/// Test double: fixed summary, or a scripted failure.
pub struct FakeSummarizer {
    summary: String,
    fail_with: Option<crate::error::PipelineError>,
}

impl FakeSummarizer {
    pub fn with_summary(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            fail_with: None,
        }
    }

    pub fn failing(err: crate::error::PipelineError) -> Self {
        Self {
            summary: String::new(),
            fail_with: Some(err),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, _corrected_text: &str) -> PipelineResult<String> {
        if let Some(err) = &self.fail_with {
            return Err(clone_error(err));
        }
        Ok(self.summary.clone())
    }
}

// PipelineError is not Clone (anyhow inside); rebuild the same class for the
// scripted-failure fakes.
fn clone_error(err: &crate::error::PipelineError) -> crate::error::PipelineError {
    use crate::error::PipelineError;
    match err {
        PipelineError::Transient(m) => PipelineError::Transient(m.clone()),
        PipelineError::PermanentInput(m) => PipelineError::PermanentInput(m.clone()),
        PipelineError::ConcurrencyConflict(id) => PipelineError::ConcurrencyConflict(*id),
        PipelineError::NotFound(m) => PipelineError::NotFound(m.clone()),
        PipelineError::Internal(e) => PipelineError::Internal(anyhow::anyhow!("{e}")),
    }
}

/// Join segment texts into the flat transcript string persisted next to them.
pub fn joined_text(segments: &[SpeakerSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::seg;

    #[tokio::test]
    async fn test_fake_refiner_preserves_speaker_and_timing() {
        let refiner = FakeRefiner::uppercasing();
        let input = vec![seg("Speaker 0", 1.0, 2.0, "hello")];
        let out = refiner.refine(&input).await.unwrap();

        assert_eq!(out[0].speaker, "Speaker 0");
        assert_eq!(out[0].start, 1.0);
        assert_eq!(out[0].end, 2.0);
        assert_eq!(out[0].text, "HELLO");
    }

    #[test]
    fn test_joined_text_skips_empty() {
        let segments = vec![
            seg("Speaker 0", 0.0, 1.0, "one"),
            seg("Speaker 1", 1.0, 2.0, ""),
            seg("Speaker 0", 2.0, 3.0, "two"),
        ];
        assert_eq!(joined_text(&segments), "one two");
    }
}
