//! Audio compression for transcription uploads.
//!
//! Re-encodes uploaded recordings to mono 16 kHz 64 kbps MP3 before they are
//! chunked and sent to the transcription provider. Compression is an
//! optimization, not a correctness step: small files skip it, and a missing or
//! failing ffmpeg falls back to the original file with a warning.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// Check if ffmpeg is available on the system.
pub fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok()
}

/// Check if ffprobe is available on the system.
pub fn ffprobe_available() -> bool {
    which::which("ffprobe").is_ok()
}

/// Get file size in bytes.
pub fn file_size(path: &Path) -> Result<u64> {
    let metadata = std::fs::metadata(path).context("Failed to read file metadata")?;
    Ok(metadata.len())
}

/// Compress an audio file for transcription.
///
/// Files at or under `threshold_bytes` are returned as-is. Otherwise the file
/// is re-encoded to mono 16 kHz 64 kbps MP3 in a temp location; the caller
/// owns cleanup of the returned path when it differs from the input.
pub fn compress_for_transcription(input: &Path, threshold_bytes: u64) -> Result<PathBuf> {
    let size = file_size(input)?;
    if size <= threshold_bytes {
        return Ok(input.to_path_buf());
    }

    if !ffmpeg_available() {
        warn!("ffmpeg not found, using original file for transcription");
        return Ok(input.to_path_buf());
    }

    let temp_dir = std::env::temp_dir();
    let filename = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    let output = temp_dir.join(format!("{}_compressed.mp3", filename));

    // -ac 1: mono, -ar 16000: 16kHz, -b:a 64k: speech-grade bitrate
    let result = Command::new("ffmpeg")
        .args(["-i", &input.to_string_lossy()])
        .args(["-ac", "1"])
        .args(["-ar", "16000"])
        .args(["-b:a", "64k"])
        .args(["-y"])
        .arg(&output)
        .output();

    match result {
        Ok(out) if out.status.success() && output.exists() => {
            info!(
                "Compressed {:?} ({} bytes) -> {:?} ({} bytes)",
                input,
                size,
                output,
                file_size(&output).unwrap_or(0)
            );
            Ok(output)
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr);
            warn!("ffmpeg compression failed, using original: {}", stderr.trim());
            let _ = std::fs::remove_file(&output);
            Ok(input.to_path_buf())
        }
        Err(e) => {
            warn!("Failed to run ffmpeg, using original: {}", e);
            Ok(input.to_path_buf())
        }
    }
}

/// Remove a temporary compressed file, ignoring errors.
pub fn cleanup_temp_file(path: &Path) {
    let _ = std::fs::remove_file(path);
}
