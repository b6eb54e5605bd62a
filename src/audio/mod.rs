//! Audio handling for the processing pipeline: ffmpeg compression and
//! size-ceiling chunking with exact start offsets.

pub mod chunker;
pub mod compression;

pub use chunker::{AudioChunk, AudioSplitter, ChunkPlan, ChunkSet, FfmpegSplitter, StaticSplitter};
pub use compression::compress_for_transcription;
