//! Meeting domain types: the status state machine and presentation helpers
//! derived from the persisted record.

pub mod status;

pub use status::MeetingStatus;

use crate::db::SpeakerMapping;
use crate::transcription::SpeakerSegment;
use serde::Serialize;
use std::collections::HashMap;

/// One line of the chat-style transcript view: a corrected segment with its
/// speaker label resolved through the meeting's mappings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatLine {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Build the chat view by applying the current speaker mappings to the
/// corrected segments. Unmapped (or empty-named) labels pass through as-is.
///
/// This is presentation-only and never persisted: it is recomputed from
/// (corrected segments × mappings) on every read, so renaming a speaker
/// retroactively updates the whole view.
pub fn chat_view(segments: &[SpeakerSegment], mappings: &[SpeakerMapping]) -> Vec<ChatLine> {
    let names: HashMap<&str, &str> = mappings
        .iter()
        .filter(|m| !m.speaker_name.is_empty())
        .map(|m| (m.speaker_label.as_str(), m.speaker_name.as_str()))
        .collect();

    segments
        .iter()
        .map(|s| ChatLine {
            speaker: names
                .get(s.speaker.as_str())
                .map(|n| n.to_string())
                .unwrap_or_else(|| s.speaker.clone()),
            start: s.start,
            end: s.end,
            text: s.text.clone(),
        })
        .collect()
}

/// Distinct speaker labels in order of first appearance.
pub fn distinct_labels(segments: &[SpeakerSegment]) -> Vec<String> {
    let mut labels = Vec::new();
    for segment in segments {
        if !segment.speaker.is_empty() && !labels.contains(&segment.speaker) {
            labels.push(segment.speaker.clone());
        }
    }
    labels
}

/// Check the segment ordering invariant: sorted by start time, with
/// `start <= end` on every segment.
pub fn segments_well_formed(segments: &[SpeakerSegment]) -> bool {
    segments.windows(2).all(|w| w[0].start <= w[1].start)
        && segments.iter().all(|s| s.start <= s.end && s.start >= 0.0)
}
