//! Chat-completion client and the production refiner/summarizer built on it.
//!
//! The refiner ships the speaker segments as JSON and asks for the same array
//! back with only the text fields corrected. Provider replies are validated
//! hard: wrong count, broken JSON, or an unknown speaker label means the raw
//! segments are kept as-is instead of corrupting timing or speaker
//! attribution. speaker/start/end are restored from the input wholesale, so
//! the reply cannot move a word between speakers even if it tries.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{Summarizer, TextRefiner};
use crate::config::LlmProviderConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::transcription::SpeakerSegment;

const CORRECTION_SYSTEM_PROMPT: &str = "You are a transcript correction assistant. You receive \
speaker-attributed meeting segments as a JSON array and return the same array with only the \
text fields corrected.";

const CORRECTION_PROMPT: &str = "The following is a JSON array of speaker-attributed segments \
from a meeting transcription. Correct only the `text` field of each segment:\n\
1. Fix spelling, punctuation, and obvious speech-to-text misrecognitions from context.\n\
2. Complete broken sentence fragments naturally.\n\
3. Never change the `speaker`, `start`, or `end` values.\n\
4. Never reorder, add, or remove segments.\n\
Output only the corrected JSON array, no other commentary.\n\n";

const SUMMARY_SYSTEM_PROMPT: &str = "You are a meeting-minutes assistant. You produce structured \
markdown summaries of meeting transcripts.";

const SUMMARY_PROMPT: &str = "Summarize the following meeting transcript using exactly this \
structure:\n\n\
## Meeting Summary\n\n\
### Attendees\n- (derived from the speaker labels present)\n\n\
### Discussion Topics\n1. [topic]: summary\n\n\
### Decisions\n- [decision]\n\n\
### Action Items\n- [ ] [task] - owner: [speaker]\n\n\
---\nTranscript:\n";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Thin client over an OpenAI-style `/chat/completions` endpoint, shared by
/// the refiner and summarizer.
pub struct ChatCompletionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionClient {
    pub fn new(config: &LlmProviderConfig, timeout: Duration) -> PipelineResult<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            PipelineError::Internal(anyhow::anyhow!("providers.llm.api_key is not configured"))
        })?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Internal(e.into()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
        })
    }

    pub async fn complete(
        &self,
        system: &str,
        user: String,
        temperature: f64,
    ) -> PipelineResult<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": temperature,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest("llm provider", e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PipelineError::from_reqwest("llm provider", e))?;

        if !status.is_success() {
            return Err(PipelineError::from_status("llm provider", status, &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Internal(anyhow::anyhow!("Failed to parse chat response: {e}"))
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::transient("llm provider returned an empty completion"))
    }
}

/// Strip a markdown code fence from a model reply, if present.
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let without_open = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => return trimmed,
    };
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Validate a corrected-segments reply against the input. Returns the
/// corrected list with speaker/start/end restored from the input, or `None`
/// when the reply is unusable (caller keeps the input).
fn validate_corrected(
    original: &[SpeakerSegment],
    reply: &str,
) -> Option<Vec<SpeakerSegment>> {
    #[derive(Deserialize)]
    struct CorrectedSegment {
        text: String,
    }

    let corrected: Vec<CorrectedSegment> = serde_json::from_str(strip_code_fence(reply)).ok()?;

    if corrected.len() != original.len() {
        warn!(
            "Corrected segment count mismatch: {} vs {}",
            corrected.len(),
            original.len()
        );
        return None;
    }

    Some(
        original
            .iter()
            .zip(corrected)
            .map(|(orig, fixed)| SpeakerSegment {
                speaker: orig.speaker.clone(),
                start: orig.start,
                end: orig.end,
                text: fixed.text,
            })
            .collect(),
    )
}

fn check_input_ceiling(len: usize, max_input_chars: usize, what: &str) -> PipelineResult<()> {
    if len > max_input_chars {
        return Err(PipelineError::permanent(format!(
            "{what} input is {len} chars, over the configured limit of {max_input_chars}"
        )));
    }
    Ok(())
}

pub struct OpenAiRefiner {
    client: Arc<ChatCompletionClient>,
    max_input_chars: usize,
}

impl OpenAiRefiner {
    pub fn new(client: Arc<ChatCompletionClient>, max_input_chars: usize) -> Self {
        Self {
            client,
            max_input_chars,
        }
    }
}

#[async_trait]
impl TextRefiner for OpenAiRefiner {
    async fn refine(&self, segments: &[SpeakerSegment]) -> PipelineResult<Vec<SpeakerSegment>> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let input_json = serde_json::to_string_pretty(segments)
            .map_err(|e| PipelineError::Internal(e.into()))?;
        check_input_ceiling(input_json.len(), self.max_input_chars, "refinement")?;

        let reply = self
            .client
            .complete(
                CORRECTION_SYSTEM_PROMPT,
                format!("{CORRECTION_PROMPT}{input_json}"),
                0.3,
            )
            .await?;

        match validate_corrected(segments, &reply) {
            Some(corrected) => {
                info!("Refined {} segments", corrected.len());
                Ok(corrected)
            }
            None => {
                warn!("Unusable correction reply, keeping raw segments");
                Ok(segments.to_vec())
            }
        }
    }
}

pub struct OpenAiSummarizer {
    client: Arc<ChatCompletionClient>,
    max_input_chars: usize,
}

impl OpenAiSummarizer {
    pub fn new(client: Arc<ChatCompletionClient>, max_input_chars: usize) -> Self {
        Self {
            client,
            max_input_chars,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, corrected_text: &str) -> PipelineResult<String> {
        check_input_ceiling(corrected_text.len(), self.max_input_chars, "summarization")?;

        let summary = self
            .client
            .complete(
                SUMMARY_SYSTEM_PROMPT,
                format!("{SUMMARY_PROMPT}{corrected_text}"),
                0.5,
            )
            .await?;

        info!("Generated summary: {} chars", summary.len());
        Ok(summary)
    }
}
