//! Stitches per-chunk transcription results into one global transcript.
//!
//! Chunk-local timestamps are re-based by each chunk's start offset. Speaker
//! labels are kept exactly as the provider assigned them per chunk: the same
//! voice may be "Speaker 0" in one chunk and "Speaker 1" in the next, and no
//! cross-chunk identity inference is attempted here; label fragmentation is
//! resolved downstream by manual speaker mapping.

use super::{ChunkTranscript, SpeakerSegment};

/// One chunk's transcript paired with its global start offset.
#[derive(Debug, Clone)]
pub struct ChunkResult {
    pub start_offset: f64,
    pub transcript: ChunkTranscript,
}

/// The merged, globally ordered transcript.
#[derive(Debug, Clone, Default)]
pub struct MergedTranscript {
    pub text: String,
    pub segments: Vec<SpeakerSegment>,
}

/// Merge chunk results into one document ordered by global start time, ties
/// broken by chunk order then within-chunk order. `chunks` must already be in
/// chronological chunk order.
pub fn merge_chunks(chunks: &[ChunkResult]) -> MergedTranscript {
    let mut segments = Vec::new();
    let mut texts = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        if !chunk.transcript.text.is_empty() {
            texts.push(chunk.transcript.text.as_str());
        }
        for segment in &chunk.transcript.segments {
            segments.push(SpeakerSegment {
                speaker: segment.speaker.clone(),
                start: segment.start + chunk.start_offset,
                end: segment.end + chunk.start_offset,
                text: segment.text.clone(),
            });
        }
    }

    // Stable sort: equal start times keep chunk order, then within-chunk
    // order, since that is the order segments were pushed in.
    segments.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

    MergedTranscript {
        text: texts.join(" "),
        segments,
    }
}
