//! The pipeline state machine.
//!
//! Drives a meeting record through compress → transcribe → correct →
//! summarize, persisting status before each stage's work and stage output
//! atomically with the advance to the next state. The entry point resumes
//! from whatever status is persisted, so the same code path serves first
//! runs, crash recovery after restart, and manual re-entry.
//!
//! Every transition is a compare-and-set against the expected current status:
//! a duplicate task delivery, a competing worker, or a deletion mid-flight
//! shows up as a stale or missing CAS and the handler stops silently instead
//! of writing. `status = failed` is written in exactly one place, with the
//! terminal error's message recorded verbatim for the status endpoint.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::retry::{with_retry, RetryPolicy};
use crate::audio::chunker::{AudioSplitter, ChunkPlan, ChunkSet};
use crate::audio::compression::{cleanup_temp_file, compress_for_transcription};
use crate::db::{Database, MeetingRecord, MeetingRepository, SpeakerMappingRepository, Transition};
use crate::error::{PipelineError, PipelineResult};
use crate::meeting::{distinct_labels, MeetingStatus};
use crate::text::{joined_text, Summarizer, TextRefiner};
use crate::transcription::{
    merge_chunks, ChunkResult, MergedTranscript, TranscriptionAdapter,
};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub compress_threshold_bytes: u64,
    pub segment_seconds: u64,
    pub chunk_fanout: usize,
    pub retry: RetryPolicy,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            compress_threshold_bytes: 10 * 1024 * 1024,
            segment_seconds: 20 * 60,
            chunk_fanout: 3,
            retry: RetryPolicy::default(),
        }
    }
}

/// Why a stage chain stopped early.
enum StageHalt {
    /// CAS lost or record deleted: another delivery owns the record, or the
    /// meeting is gone. Results are discarded, nothing else to do.
    Superseded,
    /// The stage failed terminally; `at` is the in-progress state to fail
    /// from.
    Fatal {
        at: MeetingStatus,
        error: PipelineError,
    },
}

type StageResult = Result<(), StageHalt>;

fn fatal(at: MeetingStatus, error: PipelineError) -> StageHalt {
    StageHalt::Fatal { at, error }
}

pub struct Orchestrator {
    db: Database,
    splitter: Arc<dyn AudioSplitter>,
    transcriber: Arc<dyn TranscriptionAdapter>,
    refiner: Arc<dyn TextRefiner>,
    summarizer: Arc<dyn Summarizer>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        splitter: Arc<dyn AudioSplitter>,
        transcriber: Arc<dyn TranscriptionAdapter>,
        refiner: Arc<dyn TextRefiner>,
        summarizer: Arc<dyn Summarizer>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            db,
            splitter,
            transcriber,
            refiner,
            summarizer,
            settings,
        }
    }

    /// Run (or resume) the pipeline for one meeting. Safe to deliver twice:
    /// a record already past the expected state is left untouched.
    pub async fn process(&self, meeting_id: i64) -> PipelineResult<()> {
        let Some(record) = self.load(meeting_id)? else {
            // Task outlived its meeting; results for deleted meetings are
            // discarded, not an error.
            debug!("Meeting {meeting_id} no longer exists, dropping task");
            return Ok(());
        };

        match self.run(record).await {
            Ok(()) => Ok(()),
            Err(StageHalt::Superseded) => {
                debug!("Meeting {meeting_id} run superseded (duplicate delivery or deletion)");
                Ok(())
            }
            Err(StageHalt::Fatal { at, error }) => {
                warn!("Meeting {meeting_id} failed at {}: {error}", at.as_str());
                self.fail(meeting_id, at, &error.to_string())?;
                Err(error)
            }
        }
    }

    async fn run(&self, record: MeetingRecord) -> StageResult {
        match record.status {
            MeetingStatus::Pending => {
                if !record.has_audio() {
                    // No audio at creation: the record stays pending
                    // indefinitely, there is nothing to process.
                    debug!("Meeting {} is pending without audio, skipping", record.id);
                    return Ok(());
                }
                self.advance(record.id, MeetingStatus::Pending, MeetingStatus::Compressing)?;
                self.from_compressing(&record).await
            }
            MeetingStatus::Compressing => self.from_compressing(&record).await,
            MeetingStatus::Transcribing => self.from_transcribing(&record).await,
            MeetingStatus::Correcting => self.from_correcting(&record).await,
            MeetingStatus::Summarizing => self.from_summarizing(&record).await,
            MeetingStatus::Completed | MeetingStatus::Failed => {
                // Redelivered task for a finished run.
                debug!(
                    "Meeting {} already {}, nothing to do",
                    record.id,
                    record.status.as_str()
                );
                Ok(())
            }
        }
    }

    async fn from_compressing(&self, record: &MeetingRecord) -> StageResult {
        let compressed = self.compress(record).await?;
        self.advance(
            record.id,
            MeetingStatus::Compressing,
            MeetingStatus::Transcribing,
        )?;
        self.transcribe_and_continue(record, compressed).await
    }

    /// Resume path: the process died (or the task was redelivered) after the
    /// record reached transcribing. The compressed file was transient, so it
    /// is re-derived; compression is idempotent on the stored audio.
    async fn from_transcribing(&self, record: &MeetingRecord) -> StageResult {
        let compressed = self
            .compress_for(record, MeetingStatus::Transcribing)
            .await?;
        self.transcribe_and_continue(record, compressed).await
    }

    async fn from_correcting(&self, record: &MeetingRecord) -> StageResult {
        if record.raw_segments.is_empty() && record.transcript.is_empty() {
            return Err(fatal(
                MeetingStatus::Correcting,
                PipelineError::permanent("no transcript available to correct"),
            ));
        }
        self.correct_and_continue(record.id, record.raw_segments.clone())
            .await
    }

    async fn from_summarizing(&self, record: &MeetingRecord) -> StageResult {
        let text = record.best_transcript().to_string();
        if text.is_empty() {
            return Err(fatal(
                MeetingStatus::Summarizing,
                PipelineError::permanent("no transcript available to summarize"),
            ));
        }
        self.summarize_and_complete(record.id, text).await
    }

    async fn compress(&self, record: &MeetingRecord) -> Result<PathBuf, StageHalt> {
        self.compress_for(record, MeetingStatus::Compressing).await
    }

    async fn compress_for(
        &self,
        record: &MeetingRecord,
        at: MeetingStatus,
    ) -> Result<PathBuf, StageHalt> {
        let audio_path = record
            .audio_path
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                fatal(
                    at,
                    PipelineError::permanent(format!(
                        "meeting {} has no audio file to process",
                        record.id
                    )),
                )
            })?;

        let threshold = self.settings.compress_threshold_bytes;
        let input = PathBuf::from(audio_path);
        tokio::task::spawn_blocking(move || compress_for_transcription(&input, threshold))
            .await
            .map_err(|e| fatal(at, PipelineError::Internal(anyhow::anyhow!(e))))?
            .map_err(|e| fatal(at, PipelineError::permanent(e.to_string())))
    }

    async fn transcribe_and_continue(
        &self,
        record: &MeetingRecord,
        compressed: PathBuf,
    ) -> StageResult {
        let merged = self
            .transcribe_audio(&compressed)
            .await
            .map_err(|e| fatal(MeetingStatus::Transcribing, e))?;

        // The compressed file was scratch space; the stored payload stays.
        if record.audio_path.as_deref() != Some(compressed.to_string_lossy().as_ref()) {
            cleanup_temp_file(&compressed);
        }

        info!(
            "Meeting {} transcribed: {} chars, {} segments",
            record.id,
            merged.text.len(),
            merged.segments.len()
        );

        self.persist(
            record.id,
            MeetingRepository::store_transcription(
                &self.open().map_err(|e| fatal(MeetingStatus::Transcribing, e))?,
                record.id,
                &merged.text,
                &merged.segments,
            ),
            MeetingStatus::Transcribing,
        )?;

        self.seed_speaker_labels(record.id, &merged);

        self.correct_and_continue(record.id, merged.segments).await
    }

    /// Chunk the audio, fan transcription calls out under the concurrency
    /// limit, and merge. Any chunk failing after retries fails the whole
    /// stage; partial chunk output is discarded, it is re-derived on retry.
    async fn transcribe_audio(&self, audio_path: &Path) -> PipelineResult<MergedTranscript> {
        let plan = ChunkPlan {
            max_upload_bytes: self.transcriber.max_upload_bytes(),
            segment_seconds: self.settings.segment_seconds,
        };

        let path = audio_path.to_path_buf();
        let splitter = self.splitter.clone();
        let chunk_set: ChunkSet =
            tokio::task::spawn_blocking(move || splitter.split(&path, &plan))
                .await
                .map_err(|e| PipelineError::Internal(anyhow::anyhow!(e)))??;

        debug!("Transcribing {} chunk(s)", chunk_set.len());

        let semaphore = Arc::new(Semaphore::new(self.settings.chunk_fanout.max(1)));
        let mut handles = Vec::with_capacity(chunk_set.len());

        for chunk in chunk_set.chunks.iter().cloned() {
            let adapter = self.transcriber.clone();
            let retry = self.settings.retry;
            let semaphore = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| PipelineError::Internal(anyhow::anyhow!(e)))?;
                let offset = chunk.start_offset;
                let transcript = with_retry(&retry, "transcription", || {
                    let chunk = chunk.clone();
                    let adapter = adapter.clone();
                    async move { adapter.transcribe(&chunk).await }
                })
                .await?;
                Ok::<ChunkResult, PipelineError>(ChunkResult {
                    start_offset: offset,
                    transcript,
                })
            }));
        }

        // Barrier: the merge needs every chunk's result, in chunk order.
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            let result = handle
                .await
                .map_err(|e| PipelineError::Internal(anyhow::anyhow!(e)))??;
            results.push(result);
        }

        // Chunk temp files are removed when chunk_set drops, after the merge.
        Ok(merge_chunks(&results))
    }

    /// Seed mapping rows for labels first revealed by this transcription.
    /// Best-effort: a mapping seed failure must not fail the stage.
    fn seed_speaker_labels(&self, meeting_id: i64, merged: &MergedTranscript) {
        let labels = distinct_labels(&merged.segments);
        if labels.is_empty() {
            return;
        }
        let seeded = self.open().and_then(|conn| {
            SpeakerMappingRepository::seed_labels(
                &conn,
                meeting_id,
                labels.iter().map(String::as_str),
            )
            .map_err(PipelineError::Internal)
        });
        match seeded {
            Ok(count) if count > 0 => {
                info!("Meeting {meeting_id}: seeded {count} new speaker label(s)")
            }
            Ok(_) => {}
            Err(e) => warn!("Meeting {meeting_id}: failed to seed speaker labels: {e}"),
        }
    }

    async fn correct_and_continue(
        &self,
        meeting_id: i64,
        raw_segments: Vec<crate::transcription::SpeakerSegment>,
    ) -> StageResult {
        let refiner = self.refiner.clone();
        let corrected = with_retry(&self.settings.retry, "refinement", || {
            let segments = raw_segments.clone();
            let refiner = refiner.clone();
            async move { refiner.refine(&segments).await }
        })
        .await
        .map_err(|e| fatal(MeetingStatus::Correcting, e))?;

        let corrected_text = joined_text(&corrected);

        self.persist(
            meeting_id,
            MeetingRepository::store_correction(
                &self.open().map_err(|e| fatal(MeetingStatus::Correcting, e))?,
                meeting_id,
                &corrected_text,
                &corrected,
            ),
            MeetingStatus::Correcting,
        )?;

        self.summarize_and_complete(meeting_id, corrected_text).await
    }

    async fn summarize_and_complete(&self, meeting_id: i64, text: String) -> StageResult {
        let summarizer = self.summarizer.clone();
        let summary = with_retry(&self.settings.retry, "summarization", || {
            let text = text.clone();
            let summarizer = summarizer.clone();
            async move { summarizer.summarize(&text).await }
        })
        .await
        .map_err(|e| fatal(MeetingStatus::Summarizing, e))?;

        self.persist(
            meeting_id,
            MeetingRepository::store_summary(
                &self.open().map_err(|e| fatal(MeetingStatus::Summarizing, e))?,
                meeting_id,
                &summary,
            ),
            MeetingStatus::Summarizing,
        )?;

        info!("Meeting {meeting_id} processing completed");
        Ok(())
    }

    /// Manual re-entry: re-run the whole pipeline from transcription.
    ///
    /// Only terminal records qualify; an active run is a synchronous
    /// `ConcurrencyConflict`, never queued behind the current one. The
    /// corrected transcript and summary are derived from the transcript about
    /// to be replaced, so they are wiped in the same reset.
    pub async fn retrigger_transcription(&self, meeting_id: i64) -> PipelineResult<()> {
        let record = self.require(meeting_id)?;

        if !record.status.is_terminal() {
            return Err(PipelineError::ConcurrencyConflict(meeting_id));
        }
        if !record.has_audio() {
            return Err(PipelineError::not_found(format!(
                "meeting {meeting_id} has no audio file"
            )));
        }

        match MeetingRepository::reset_for_transcription(&self.open()?, meeting_id)
            .map_err(PipelineError::Internal)?
        {
            Transition::Applied => {
                info!("Meeting {meeting_id} reset for re-transcription");
                Ok(())
            }
            // Lost a race with another re-trigger or a fresh run.
            Transition::Stale => Err(PipelineError::ConcurrencyConflict(meeting_id)),
            Transition::Missing => Err(PipelineError::not_found(format!(
                "meeting {meeting_id} not found"
            ))),
        }
    }

    /// Manual re-entry at the summarizing stage only; the transcript is kept.
    pub async fn retrigger_summary(&self, meeting_id: i64) -> PipelineResult<()> {
        let record = self.require(meeting_id)?;

        if !record.status.is_terminal() {
            return Err(PipelineError::ConcurrencyConflict(meeting_id));
        }
        if !record.has_transcript() {
            return Err(PipelineError::not_found(format!(
                "meeting {meeting_id} has no transcript; run transcription first"
            )));
        }

        match MeetingRepository::reset_for_summary(&self.open()?, meeting_id)
            .map_err(PipelineError::Internal)?
        {
            Transition::Applied => {
                info!("Meeting {meeting_id} reset for re-summarization");
                Ok(())
            }
            Transition::Stale => Err(PipelineError::ConcurrencyConflict(meeting_id)),
            Transition::Missing => Err(PipelineError::not_found(format!(
                "meeting {meeting_id} not found"
            ))),
        }
    }

    fn open(&self) -> Result<rusqlite::Connection, PipelineError> {
        self.db.open().map_err(PipelineError::Internal)
    }

    fn load(&self, meeting_id: i64) -> PipelineResult<Option<MeetingRecord>> {
        let conn = self.open()?;
        MeetingRepository::get(&conn, meeting_id).map_err(PipelineError::Internal)
    }

    fn require(&self, meeting_id: i64) -> PipelineResult<MeetingRecord> {
        self.load(meeting_id)?.ok_or_else(|| {
            PipelineError::not_found(format!("meeting {meeting_id} not found"))
        })
    }

    /// Persist status before a stage runs. Stale/missing ends the chain.
    fn advance(&self, meeting_id: i64, from: MeetingStatus, to: MeetingStatus) -> StageResult {
        debug_assert!(from.can_transition_to(to));
        let conn = self.open().map_err(|e| fatal(from, e))?;
        self.persist(
            meeting_id,
            MeetingRepository::begin_stage(&conn, meeting_id, from, to),
            from,
        )
    }

    /// Interpret a CAS result: applied continues, stale/missing halts the
    /// chain silently (duplicate delivery or deletion), storage errors fail
    /// the stage.
    fn persist(
        &self,
        meeting_id: i64,
        result: anyhow::Result<Transition>,
        at: MeetingStatus,
    ) -> StageResult {
        match result {
            Ok(Transition::Applied) => Ok(()),
            Ok(Transition::Stale) => {
                debug!(
                    "Meeting {meeting_id}: state moved past {} under us, dropping results",
                    at.as_str()
                );
                Err(StageHalt::Superseded)
            }
            Ok(Transition::Missing) => {
                debug!("Meeting {meeting_id} deleted mid-flight, dropping results");
                Err(StageHalt::Superseded)
            }
            Err(e) => Err(fatal(at, PipelineError::Internal(e))),
        }
    }

    /// The single place `status = failed` is written. CAS-guarded on the
    /// in-progress state this worker owned; losing that race means another
    /// delivery advanced the record and this failure is obsolete.
    fn fail(&self, meeting_id: i64, at: MeetingStatus, message: &str) -> PipelineResult<()> {
        let conn = self.open()?;
        match MeetingRepository::mark_failed(&conn, meeting_id, at, message)
            .map_err(PipelineError::Internal)?
        {
            Transition::Applied => Ok(()),
            Transition::Stale | Transition::Missing => {
                debug!("Meeting {meeting_id}: failure from {} obsolete", at.as_str());
                Ok(())
            }
        }
    }
}

// Orchestrator behavior is covered end-to-end in tests/pipeline.rs against a
// temp-file database with fake providers; the repository-level CAS mechanics
// are unit-tested in db::meetings.
