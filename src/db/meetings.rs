//! Meeting record persistence.
//!
//! Raw SQL with rusqlite, no ORM. Stage transitions are compare-and-set
//! UPDATEs guarded on the expected current status: the persisted status is
//! the single source of truth for the pipeline, so a duplicate task delivery
//! or a race between two workers resolves here (zero rows affected) instead
//! of in process-local state. Stage outputs are written in the same statement
//! that advances the status.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::init::now_rfc3339;
use crate::meeting::status::MeetingStatus;
use crate::transcription::SpeakerSegment;

/// A meeting record from the database.
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub id: i64,
    pub team_id: String,
    pub created_by: String,
    pub title: String,
    pub meeting_at: String,
    pub audio_path: Option<String>,
    pub audio_expires_at: Option<String>,
    pub status: MeetingStatus,
    pub error_message: String,
    pub transcript: String,
    pub raw_segments: Vec<SpeakerSegment>,
    pub corrected_transcript: String,
    pub corrected_segments: Vec<SpeakerSegment>,
    pub summary: String,
    pub wiki_page_id: String,
    pub wiki_page_url: String,
    pub chat_message_ts: String,
    pub chat_channel: String,
    pub created_at: String,
    pub updated_at: String,
}

impl MeetingRecord {
    pub fn has_audio(&self) -> bool {
        self.audio_path.as_deref().is_some_and(|p| !p.is_empty())
    }

    pub fn has_transcript(&self) -> bool {
        !self.transcript.is_empty() || !self.corrected_transcript.is_empty()
    }

    /// Text fed to summarization: corrected when available, raw otherwise.
    pub fn best_transcript(&self) -> &str {
        if !self.corrected_transcript.is_empty() {
            &self.corrected_transcript
        } else {
            &self.transcript
        }
    }
}

/// Fields supplied at creation; everything else starts at its default.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub team_id: String,
    pub created_by: String,
    pub title: String,
    pub meeting_at: String,
    pub audio_path: Option<String>,
    pub audio_expires_at: Option<String>,
}

/// Outcome of a compare-and-set update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The guarded update applied.
    Applied,
    /// The record exists but was not in the expected state; another delivery
    /// of the same work already ran, or a competing worker won the race.
    Stale,
    /// The record is gone (deleted mid-flight); discard any pending results.
    Missing,
}

/// Which connector's cross-reference to store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishTarget {
    Wiki,
    Chat,
}

fn segments_to_json(segments: &[SpeakerSegment]) -> Result<String> {
    serde_json::to_string(segments).context("Failed to serialize segments")
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MeetingRecord> {
    let status_str: String = row.get(7)?;
    let status = MeetingStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown meeting status '{status_str}'").into(),
        )
    })?;

    let raw_json: String = row.get(9)?;
    let raw_segments: Vec<SpeakerSegment> = serde_json::from_str(&raw_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, e.into())
    })?;

    let corrected_json: String = row.get(11)?;
    let corrected_segments: Vec<SpeakerSegment> =
        serde_json::from_str(&corrected_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, e.into())
        })?;

    Ok(MeetingRecord {
        id: row.get(0)?,
        team_id: row.get(1)?,
        created_by: row.get(2)?,
        title: row.get(3)?,
        meeting_at: row.get(4)?,
        audio_path: row.get(5)?,
        audio_expires_at: row.get(6)?,
        status,
        error_message: row.get(8)?,
        transcript: row.get(10)?,
        raw_segments,
        corrected_transcript: row.get(12)?,
        corrected_segments,
        summary: row.get(13)?,
        wiki_page_id: row.get(14)?,
        wiki_page_url: row.get(15)?,
        chat_message_ts: row.get(16)?,
        chat_channel: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
    })
}

const RECORD_COLUMNS: &str = "id, team_id, created_by, title, meeting_at, audio_path, \
     audio_expires_at, status, error_message, raw_segments, transcript, corrected_segments, \
     corrected_transcript, summary, wiki_page_id, wiki_page_url, chat_message_ts, chat_channel, \
     created_at, updated_at";

/// Repository for meeting records.
pub struct MeetingRepository;

impl MeetingRepository {
    /// Insert a new meeting (status = pending). Returns the new meeting ID.
    pub fn insert(conn: &Connection, meeting: &NewMeeting) -> Result<i64> {
        let now = now_rfc3339();
        conn.execute(
            "INSERT INTO meetings (team_id, created_by, title, meeting_at, audio_path, \
             audio_expires_at, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                meeting.team_id,
                meeting.created_by,
                meeting.title,
                meeting.meeting_at,
                meeting.audio_path,
                meeting.audio_expires_at,
                MeetingStatus::Pending.as_str(),
                now,
            ],
        )
        .context("Failed to insert meeting")?;

        Ok(conn.last_insert_rowid())
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<MeetingRecord>> {
        conn.query_row(
            &format!("SELECT {RECORD_COLUMNS} FROM meetings WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()
        .context("Failed to query meeting")
    }

    pub fn delete(conn: &Connection, id: i64) -> Result<bool> {
        let rows = conn
            .execute("DELETE FROM meetings WHERE id = ?1", params![id])
            .context("Failed to delete meeting")?;
        Ok(rows > 0)
    }

    fn exists(conn: &Connection, id: i64) -> Result<bool> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM meetings WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check meeting existence")?;
        Ok(count > 0)
    }

    fn cas_outcome(conn: &Connection, id: i64, rows: usize) -> Result<Transition> {
        if rows > 0 {
            Ok(Transition::Applied)
        } else if Self::exists(conn, id)? {
            Ok(Transition::Stale)
        } else {
            Ok(Transition::Missing)
        }
    }

    /// Advance the status with no output fields, guarded on the expected
    /// current status. Persisted before the stage's work begins, so pollers
    /// always see the stage about to run.
    pub fn begin_stage(
        conn: &Connection,
        id: i64,
        from: MeetingStatus,
        to: MeetingStatus,
    ) -> Result<Transition> {
        let rows = conn
            .execute(
                "UPDATE meetings SET status = ?1, updated_at = ?2 \
                 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), now_rfc3339(), id, from.as_str()],
            )
            .context("Failed to advance meeting stage")?;
        Self::cas_outcome(conn, id, rows)
    }

    /// Persist transcription output and advance transcribing → correcting in
    /// one statement.
    pub fn store_transcription(
        conn: &Connection,
        id: i64,
        transcript: &str,
        segments: &[SpeakerSegment],
    ) -> Result<Transition> {
        let rows = conn
            .execute(
                "UPDATE meetings SET transcript = ?1, raw_segments = ?2, status = ?3, \
                 updated_at = ?4 WHERE id = ?5 AND status = ?6",
                params![
                    transcript,
                    segments_to_json(segments)?,
                    MeetingStatus::Correcting.as_str(),
                    now_rfc3339(),
                    id,
                    MeetingStatus::Transcribing.as_str(),
                ],
            )
            .context("Failed to store transcription")?;
        Self::cas_outcome(conn, id, rows)
    }

    /// Persist corrected output and advance correcting → summarizing.
    pub fn store_correction(
        conn: &Connection,
        id: i64,
        corrected_transcript: &str,
        segments: &[SpeakerSegment],
    ) -> Result<Transition> {
        let rows = conn
            .execute(
                "UPDATE meetings SET corrected_transcript = ?1, corrected_segments = ?2, \
                 status = ?3, updated_at = ?4 WHERE id = ?5 AND status = ?6",
                params![
                    corrected_transcript,
                    segments_to_json(segments)?,
                    MeetingStatus::Summarizing.as_str(),
                    now_rfc3339(),
                    id,
                    MeetingStatus::Correcting.as_str(),
                ],
            )
            .context("Failed to store correction")?;
        Self::cas_outcome(conn, id, rows)
    }

    /// Persist the summary and advance summarizing → completed, clearing any
    /// error message from a prior failed run.
    pub fn store_summary(conn: &Connection, id: i64, summary: &str) -> Result<Transition> {
        let rows = conn
            .execute(
                "UPDATE meetings SET summary = ?1, status = ?2, error_message = '', \
                 updated_at = ?3 WHERE id = ?4 AND status = ?5",
                params![
                    summary,
                    MeetingStatus::Completed.as_str(),
                    now_rfc3339(),
                    id,
                    MeetingStatus::Summarizing.as_str(),
                ],
            )
            .context("Failed to store summary")?;
        Self::cas_outcome(conn, id, rows)
    }

    /// Record a terminal stage failure, guarded on the in-progress state the
    /// worker believes it owns.
    pub fn mark_failed(
        conn: &Connection,
        id: i64,
        from: MeetingStatus,
        error_message: &str,
    ) -> Result<Transition> {
        let rows = conn
            .execute(
                "UPDATE meetings SET status = ?1, error_message = ?2, updated_at = ?3 \
                 WHERE id = ?4 AND status = ?5",
                params![
                    MeetingStatus::Failed.as_str(),
                    error_message,
                    now_rfc3339(),
                    id,
                    from.as_str(),
                ],
            )
            .context("Failed to mark meeting as failed")?;
        Self::cas_outcome(conn, id, rows)
    }

    /// Reset a terminal record for re-transcription: derived fields are wiped
    /// (they describe the transcript about to be discarded) and the record
    /// re-enters the pipeline at pending. Guarded on terminal status so a
    /// re-trigger can never preempt an active run.
    pub fn reset_for_transcription(conn: &Connection, id: i64) -> Result<Transition> {
        let rows = conn
            .execute(
                "UPDATE meetings SET status = ?1, error_message = '', transcript = '', \
                 raw_segments = '[]', corrected_transcript = '', corrected_segments = '[]', \
                 summary = '', updated_at = ?2 \
                 WHERE id = ?3 AND status IN ('completed', 'failed')",
                params![MeetingStatus::Pending.as_str(), now_rfc3339(), id],
            )
            .context("Failed to reset meeting for transcription")?;
        Self::cas_outcome(conn, id, rows)
    }

    /// Re-enter a terminal record at summarizing; transcript fields are kept.
    pub fn reset_for_summary(conn: &Connection, id: i64) -> Result<Transition> {
        let rows = conn
            .execute(
                "UPDATE meetings SET status = ?1, error_message = '', updated_at = ?2 \
                 WHERE id = ?3 AND status IN ('completed', 'failed')",
                params![MeetingStatus::Summarizing.as_str(), now_rfc3339(), id],
            )
            .context("Failed to reset meeting for summarization")?;
        Self::cas_outcome(conn, id, rows)
    }

    /// Ids of records with an interrupted or not-yet-started run, for startup
    /// recovery. Pending records without audio are not included: they never
    /// auto-advance.
    pub fn in_flight(conn: &Connection) -> Result<Vec<i64>> {
        let mut stmt = conn
            .prepare(
                "SELECT id FROM meetings WHERE status IN \
                 ('compressing', 'transcribing', 'correcting', 'summarizing') \
                 OR (status = 'pending' AND audio_path IS NOT NULL) \
                 ORDER BY id",
            )
            .context("Failed to prepare in-flight query")?;

        let ids = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query in-flight meetings")?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Records whose audio payload is past its retention horizon.
    pub fn expired_audio(conn: &Connection, now: &str) -> Result<Vec<(i64, String)>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, audio_path FROM meetings \
                 WHERE audio_expires_at IS NOT NULL AND audio_expires_at <= ?1 \
                 AND audio_path IS NOT NULL AND audio_path != '' \
                 ORDER BY id",
            )
            .context("Failed to prepare expiry query")?;

        let rows = stmt
            .query_map(params![now], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("Failed to query expired audio")?
            .collect::<rusqlite::Result<Vec<(i64, String)>>>()?;
        Ok(rows)
    }

    /// Clear the audio reference after its payload was deleted. Text and
    /// summary fields are untouched.
    pub fn clear_audio(conn: &Connection, id: i64) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET audio_path = NULL, audio_expires_at = NULL, updated_at = ?1 \
             WHERE id = ?2",
            params![now_rfc3339(), id],
        )
        .context("Failed to clear audio reference")?;
        Ok(())
    }

    /// Store (or overwrite, on re-publish) a connector's cross-reference.
    pub fn store_publish_ref(
        conn: &Connection,
        id: i64,
        target: PublishTarget,
        external_id: &str,
        external_location: &str,
    ) -> Result<()> {
        let sql = match target {
            PublishTarget::Wiki => {
                "UPDATE meetings SET wiki_page_id = ?1, wiki_page_url = ?2, updated_at = ?3 \
                 WHERE id = ?4"
            }
            PublishTarget::Chat => {
                "UPDATE meetings SET chat_message_ts = ?1, chat_channel = ?2, updated_at = ?3 \
                 WHERE id = ?4"
            }
        };
        conn.execute(sql, params![external_id, external_location, now_rfc3339(), id])
            .context("Failed to store publish reference")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::migrate;
    use crate::transcription::seg;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        migrate(&conn).unwrap();
        conn
    }

    fn new_meeting(audio: Option<&str>) -> NewMeeting {
        NewMeeting {
            team_id: "team-1".to_string(),
            created_by: "user-1".to_string(),
            title: "Standup".to_string(),
            meeting_at: "2026-08-07T09:00:00Z".to_string(),
            audio_path: audio.map(String::from),
            audio_expires_at: audio.map(|_| "2026-11-05T09:00:00Z".to_string()),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, MeetingStatus::Pending);
        assert_eq!(record.title, "Standup");
        assert!(record.has_audio());
        assert!(record.audio_expires_at.is_some());
        assert!(record.raw_segments.is_empty());
    }

    #[test]
    fn test_get_missing_returns_none() {
        let conn = setup_db();
        assert!(MeetingRepository::get(&conn, 999).unwrap().is_none());
    }

    #[test]
    fn test_begin_stage_cas() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();

        let t = MeetingRepository::begin_stage(
            &conn,
            id,
            MeetingStatus::Pending,
            MeetingStatus::Compressing,
        )
        .unwrap();
        assert_eq!(t, Transition::Applied);

        // Second delivery of the same work: the guard no longer matches.
        let t = MeetingRepository::begin_stage(
            &conn,
            id,
            MeetingStatus::Pending,
            MeetingStatus::Compressing,
        )
        .unwrap();
        assert_eq!(t, Transition::Stale);

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, MeetingStatus::Compressing);
    }

    #[test]
    fn test_cas_on_deleted_record_is_missing() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        assert!(MeetingRepository::delete(&conn, id).unwrap());

        let t = MeetingRepository::begin_stage(
            &conn,
            id,
            MeetingStatus::Pending,
            MeetingStatus::Compressing,
        )
        .unwrap();
        assert_eq!(t, Transition::Missing);
    }

    #[test]
    fn test_store_transcription_persists_output_with_state() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET status = 'transcribing' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        let segments = vec![seg("Speaker 0", 0.0, 2.0, "hello world")];
        let t =
            MeetingRepository::store_transcription(&conn, id, "hello world", &segments).unwrap();
        assert_eq!(t, Transition::Applied);

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, MeetingStatus::Correcting);
        assert_eq!(record.transcript, "hello world");
        assert_eq!(record.raw_segments, segments);
    }

    #[test]
    fn test_duplicate_store_is_stale_and_does_not_overwrite() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET status = 'transcribing' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        let segments = vec![seg("Speaker 0", 0.0, 2.0, "first")];
        MeetingRepository::store_transcription(&conn, id, "first", &segments).unwrap();

        // Redelivered task arrives after the record already advanced.
        let stale_segments = vec![seg("Speaker 9", 0.0, 1.0, "stale")];
        let t = MeetingRepository::store_transcription(&conn, id, "stale", &stale_segments)
            .unwrap();
        assert_eq!(t, Transition::Stale);

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.transcript, "first");
        assert_eq!(record.status, MeetingStatus::Correcting);
    }

    #[test]
    fn test_mark_failed_records_message() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET status = 'transcribing' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        let t = MeetingRepository::mark_failed(
            &conn,
            id,
            MeetingStatus::Transcribing,
            "provider rejected the audio",
        )
        .unwrap();
        assert_eq!(t, Transition::Applied);

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, MeetingStatus::Failed);
        assert_eq!(record.error_message, "provider rejected the audio");
    }

    #[test]
    fn test_reset_for_transcription_wipes_derived_fields() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET status = 'completed', transcript = 'raw', \
             corrected_transcript = 'fixed', summary = 'sum', \
             raw_segments = '[{\"speaker\":\"Speaker 0\",\"start\":0.0,\"end\":1.0,\"text\":\"x\"}]' \
             WHERE id = ?1",
            params![id],
        )
        .unwrap();

        let t = MeetingRepository::reset_for_transcription(&conn, id).unwrap();
        assert_eq!(t, Transition::Applied);

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, MeetingStatus::Pending);
        assert!(record.transcript.is_empty());
        assert!(record.corrected_transcript.is_empty());
        assert!(record.summary.is_empty());
        assert!(record.raw_segments.is_empty());
    }

    #[test]
    fn test_reset_rejected_while_in_progress() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET status = 'transcribing' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        assert_eq!(
            MeetingRepository::reset_for_transcription(&conn, id).unwrap(),
            Transition::Stale
        );
        assert_eq!(
            MeetingRepository::reset_for_summary(&conn, id).unwrap(),
            Transition::Stale
        );
    }

    #[test]
    fn test_in_flight_excludes_pending_without_audio() {
        let conn = setup_db();
        let with_audio = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        let without_audio = MeetingRepository::insert(&conn, &new_meeting(None)).unwrap();
        let stuck = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/b.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET status = 'correcting' WHERE id = ?1",
            params![stuck],
        )
        .unwrap();
        let done = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/c.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET status = 'completed' WHERE id = ?1",
            params![done],
        )
        .unwrap();

        let ids = MeetingRepository::in_flight(&conn).unwrap();
        assert!(ids.contains(&with_audio));
        assert!(ids.contains(&stuck));
        assert!(!ids.contains(&without_audio));
        assert!(!ids.contains(&done));
    }

    #[test]
    fn test_expired_audio_and_clear() {
        let conn = setup_db();
        let expired = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/old.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET audio_expires_at = '2020-01-01T00:00:00Z' WHERE id = ?1",
            params![expired],
        )
        .unwrap();
        let fresh = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/new.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET audio_expires_at = '2099-01-01T00:00:00Z' WHERE id = ?1",
            params![fresh],
        )
        .unwrap();

        let rows = MeetingRepository::expired_audio(&conn, &now_rfc3339()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, expired);

        MeetingRepository::clear_audio(&conn, expired).unwrap();
        let record = MeetingRepository::get(&conn, expired).unwrap().unwrap();
        assert!(record.audio_path.is_none());
        assert!(record.audio_expires_at.is_none());

        // Cleared records no longer match the expiry query.
        let rows = MeetingRepository::expired_audio(&conn, &now_rfc3339()).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_store_publish_refs_overwrite() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();

        MeetingRepository::store_publish_ref(&conn, id, PublishTarget::Wiki, "p1", "https://w/1")
            .unwrap();
        MeetingRepository::store_publish_ref(&conn, id, PublishTarget::Wiki, "p2", "https://w/2")
            .unwrap();
        MeetingRepository::store_publish_ref(&conn, id, PublishTarget::Chat, "170000.1", "#minutes")
            .unwrap();

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.wiki_page_id, "p2");
        assert_eq!(record.wiki_page_url, "https://w/2");
        assert_eq!(record.chat_message_ts, "170000.1");
        assert_eq!(record.chat_channel, "#minutes");
    }

    #[test]
    fn test_best_transcript_prefers_corrected() {
        let conn = setup_db();
        let id = MeetingRepository::insert(&conn, &new_meeting(Some("/tmp/a.mp3"))).unwrap();
        conn.execute(
            "UPDATE meetings SET transcript = 'raw', corrected_transcript = 'fixed' WHERE id = ?1",
            params![id],
        )
        .unwrap();

        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.best_transcript(), "fixed");
    }
}
