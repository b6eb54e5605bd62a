//! Splits an audio file into transcription-sized chunks.
//!
//! A transcription provider imposes an upload size ceiling; recordings over it
//! are cut into fixed-duration segments (`ffmpeg -f segment`, stream copy, no
//! re-encode) and each chunk carries its exact start offset within the
//! original so the merger can re-base timestamps to global time. Chunks cover
//! the input in order with no gaps and no overlaps. Input at or under the
//! ceiling produces a single chunk spanning the whole recording.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info};

use super::compression::{ffmpeg_available, ffprobe_available, file_size};
use crate::error::{PipelineError, PipelineResult};

/// One bounded slice of the original recording. Transient: lives only for the
/// duration of a transcription pass.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub path: PathBuf,
    pub index: usize,
    /// Seconds from the start of the original recording to the start of this
    /// chunk. Chunk-local timestamps plus this offset give global time.
    pub start_offset: f64,
    pub duration: f64,
    pub size_bytes: u64,
}

/// Split constraints derived from provider limits and configuration.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan {
    pub max_upload_bytes: u64,
    pub segment_seconds: u64,
}

/// The ordered chunk sequence plus ownership of the scratch directory the
/// split files live in; dropping the set removes them. A single-chunk set
/// points at the original file and owns nothing.
#[derive(Debug)]
pub struct ChunkSet {
    pub chunks: Vec<AudioChunk>,
    _temp_dir: Option<TempDir>,
}

impl ChunkSet {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.chunks.iter().map(|c| c.duration).sum()
    }
}

/// Seam for the splitting strategy, so the pipeline can be driven without
/// ffmpeg in tests.
pub trait AudioSplitter: Send + Sync {
    fn split(&self, path: &Path, plan: &ChunkPlan) -> PipelineResult<ChunkSet>;
}

/// Production splitter: ffprobe for durations, ffmpeg for segment cuts.
pub struct FfmpegSplitter;

impl AudioSplitter for FfmpegSplitter {
    fn split(&self, path: &Path, plan: &ChunkPlan) -> PipelineResult<ChunkSet> {
        split_for_transcription(path, plan)
    }
}

/// Test splitter: pretends the input consists of chunks with the given
/// durations, all pointing at the original file. Offsets accumulate exactly
/// like the real splitter's.
pub struct StaticSplitter {
    pub durations: Vec<f64>,
}

impl AudioSplitter for StaticSplitter {
    fn split(&self, path: &Path, _plan: &ChunkPlan) -> PipelineResult<ChunkSet> {
        let offsets = accumulate_offsets(&self.durations);
        let chunks = self
            .durations
            .iter()
            .enumerate()
            .map(|(index, &duration)| AudioChunk {
                path: path.to_path_buf(),
                index,
                start_offset: offsets[index],
                duration,
                size_bytes: 0,
            })
            .collect();
        Ok(ChunkSet {
            chunks,
            _temp_dir: None,
        })
    }
}

/// Whether the input needs splitting at all.
fn needs_split(size_bytes: u64, duration: f64, plan: &ChunkPlan) -> bool {
    size_bytes > plan.max_upload_bytes || duration > plan.segment_seconds as f64
}

/// Cumulative start offsets for a sequence of chunk durations: chunk i starts
/// where chunks 0..i end.
fn accumulate_offsets(durations: &[f64]) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(durations.len());
    let mut acc = 0.0;
    for d in durations {
        offsets.push(acc);
        acc += d;
    }
    offsets
}

/// Probe the duration of an audio file in seconds.
///
/// Reads `format.duration` first; some containers (WebM) carry duration only
/// on the stream, so streams are the fallback. An unreadable or undecodable
/// file is a fatal input error, never retried.
pub fn probe_duration(path: &Path) -> PipelineResult<f64> {
    if !ffprobe_available() {
        return Err(PipelineError::Internal(anyhow::anyhow!(
            "ffprobe is required to process audio but was not found"
        )));
    }

    let output = Command::new("ffprobe")
        .args(["-v", "quiet"])
        .args(["-show_entries", "format=duration:stream=duration"])
        .args(["-of", "json"])
        .arg(path)
        .output()
        .map_err(|e| PipelineError::Internal(anyhow::anyhow!("Failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(PipelineError::permanent(format!(
            "Audio file {:?} could not be decoded",
            path.file_name().unwrap_or_default()
        )));
    }

    let data: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
        PipelineError::permanent(format!("Unreadable ffprobe output for {path:?}: {e}"))
    })?;

    if let Some(duration) = data["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
    {
        debug!("Audio duration (format): {:.2}s", duration);
        return Ok(duration);
    }

    if let Some(streams) = data["streams"].as_array() {
        for stream in streams {
            if let Some(duration) = stream["duration"]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
            {
                debug!("Audio duration (stream): {:.2}s", duration);
                return Ok(duration);
            }
        }
    }

    Err(PipelineError::permanent(format!(
        "Could not determine duration of {:?}",
        path.file_name().unwrap_or_default()
    )))
}

/// Split `path` into chunks satisfying `plan`.
///
/// Undecodable input surfaces as `PermanentInput`. Every produced chunk is
/// checked against the upload ceiling; a chunk that still exceeds it (extreme
/// bitrate relative to the configured segment duration) is a fatal input
/// error rather than a silently oversized upload.
pub fn split_for_transcription(path: &Path, plan: &ChunkPlan) -> PipelineResult<ChunkSet> {
    let size_bytes = file_size(path)
        .map_err(|e| PipelineError::permanent(format!("Unreadable audio file {path:?}: {e}")))?;
    let duration = probe_duration(path)?;

    if !needs_split(size_bytes, duration, plan) {
        return Ok(ChunkSet {
            chunks: vec![AudioChunk {
                path: path.to_path_buf(),
                index: 0,
                start_offset: 0.0,
                duration,
                size_bytes,
            }],
            _temp_dir: None,
        });
    }

    if !ffmpeg_available() {
        if size_bytes <= plan.max_upload_bytes {
            // Over the duration target but under the hard ceiling: one chunk
            // is still a legal upload.
            return Ok(ChunkSet {
                chunks: vec![AudioChunk {
                    path: path.to_path_buf(),
                    index: 0,
                    start_offset: 0.0,
                    duration,
                    size_bytes,
                }],
                _temp_dir: None,
            });
        }
        return Err(PipelineError::Internal(anyhow::anyhow!(
            "audio exceeds the provider upload limit and ffmpeg is not available to split it"
        )));
    }

    let temp_dir = TempDir::with_prefix("recapd_chunks_")
        .map_err(|e| PipelineError::Internal(anyhow::anyhow!("Failed to create chunk dir: {e}")))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp3")
        .to_string();
    let pattern = temp_dir.path().join(format!("chunk_%03d.{extension}"));

    // -reset_timestamps 1 keeps each chunk's local clock starting at zero;
    // -c copy splits on container boundaries without re-encoding.
    let output = Command::new("ffmpeg")
        .args(["-i", &path.to_string_lossy()])
        .args(["-f", "segment"])
        .args(["-segment_time", &plan.segment_seconds.to_string()])
        .args(["-reset_timestamps", "1"])
        .args(["-c", "copy"])
        .args(["-y"])
        .arg(&pattern)
        .output()
        .map_err(|e| PipelineError::Internal(anyhow::anyhow!("Failed to run ffmpeg: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::permanent(format!(
            "Audio file could not be split: {}",
            stderr.trim()
        )));
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(temp_dir.path())
        .map_err(|e| PipelineError::Internal(anyhow::anyhow!("Failed to list chunks: {e}")))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("chunk_"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(PipelineError::permanent(
            "Audio split produced no chunks (undecodable input?)",
        ));
    }

    let mut durations = Vec::with_capacity(paths.len());
    for chunk_path in &paths {
        durations.push(probe_duration(chunk_path)?);
    }
    let offsets = accumulate_offsets(&durations);

    let mut chunks = Vec::with_capacity(paths.len());
    for (index, chunk_path) in paths.iter().enumerate() {
        let chunk_size = file_size(chunk_path)
            .map_err(|e| PipelineError::Internal(anyhow::anyhow!("Unreadable chunk: {e}")))?;
        if chunk_size > plan.max_upload_bytes {
            return Err(PipelineError::permanent(format!(
                "Chunk {index} is {chunk_size} bytes, over the provider limit of {} bytes; \
                 lower audio.segment_seconds",
                plan.max_upload_bytes
            )));
        }
        chunks.push(AudioChunk {
            path: chunk_path.clone(),
            index,
            start_offset: offsets[index],
            duration: durations[index],
            size_bytes: chunk_size,
        });
    }

    info!(
        "Split {:.1}s of audio into {} chunks (segment target {}s)",
        duration,
        chunks.len(),
        plan.segment_seconds
    );

    Ok(ChunkSet {
        chunks,
        _temp_dir: Some(temp_dir),
    })
}
