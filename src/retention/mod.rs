//! Retention sweep over stored audio payloads.
//!
//! Audio is kept for a fixed window after upload; derived text and summaries
//! are kept forever. The sweep selects every record whose expiry has passed
//! and still holds an audio reference, deletes the payload, and clears the
//! reference. A record that fails (storage error) is left for the next pass
//! and does not abort the sweep of the rest; re-running against an
//! already-cleared record matches nothing and is a no-op.

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::db::{now_rfc3339, Database, MeetingRepository};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    pub cleared: usize,
    pub failed: usize,
}

pub struct RetentionSweeper {
    db: Database,
}

impl RetentionSweeper {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// One sweep pass. Returns how many records were cleared and how many
    /// failed (and stay eligible for the next pass).
    pub async fn sweep(&self) -> Result<SweepOutcome> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || sweep_once(&db, &now_rfc3339())).await?
    }
}

pub fn sweep_once(db: &Database, now: &str) -> Result<SweepOutcome> {
    let conn = db.open()?;
    let expired = MeetingRepository::expired_audio(&conn, now)?;

    let mut outcome = SweepOutcome::default();
    for (meeting_id, audio_path) in expired {
        match delete_payload(Path::new(&audio_path)) {
            Ok(()) => {
                MeetingRepository::clear_audio(&conn, meeting_id)?;
                info!("Deleted expired audio for meeting {meeting_id}");
                outcome.cleared += 1;
            }
            Err(e) => {
                warn!(
                    "Failed to delete audio for meeting {meeting_id} ({audio_path}): {e}; \
                     will retry next sweep"
                );
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

/// Remove the payload file. A file that is already gone counts as deleted:
/// the goal is "no payload on disk", not "we performed the unlink".
fn delete_payload(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MeetingRepository, NewMeeting};
    use rusqlite::params;
    use std::io::Write;

    struct Fixture {
        db: Database,
        _dir: tempfile::TempDir,
        audio_dir: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::at(dir.path().join("test.db"));
        let audio_dir = dir.path().join("audio");
        std::fs::create_dir_all(&audio_dir).unwrap();
        Fixture {
            db,
            audio_dir,
            _dir: dir,
        }
    }

    fn insert_meeting(fx: &Fixture, audio_name: &str, expires_at: &str) -> (i64, std::path::PathBuf) {
        let audio_path = fx.audio_dir.join(audio_name);
        let mut file = std::fs::File::create(&audio_path).unwrap();
        file.write_all(b"fake audio payload").unwrap();

        let conn = fx.db.open().unwrap();
        let id = MeetingRepository::insert(
            &conn,
            &NewMeeting {
                team_id: "t".to_string(),
                created_by: "u".to_string(),
                title: "m".to_string(),
                meeting_at: "2026-01-01T09:00:00Z".to_string(),
                audio_path: Some(audio_path.to_string_lossy().to_string()),
                audio_expires_at: Some(expires_at.to_string()),
            },
        )
        .unwrap();
        conn.execute(
            "UPDATE meetings SET transcript = 'kept text', summary = 'kept summary' WHERE id = ?1",
            params![id],
        )
        .unwrap();
        (id, audio_path)
    }

    #[test]
    fn test_sweep_clears_expired_audio_keeps_text() {
        let fx = fixture();
        let (id, audio_path) = insert_meeting(&fx, "old.mp3", "2020-01-01T00:00:00Z");

        let outcome = sweep_once(&fx.db, &now_rfc3339()).unwrap();
        assert_eq!(outcome, SweepOutcome { cleared: 1, failed: 0 });

        assert!(!audio_path.exists());
        let conn = fx.db.open().unwrap();
        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert!(record.audio_path.is_none());
        assert!(record.audio_expires_at.is_none());
        assert_eq!(record.transcript, "kept text");
        assert_eq!(record.summary, "kept summary");
    }

    #[test]
    fn test_sweep_skips_unexpired_audio() {
        let fx = fixture();
        let (id, audio_path) = insert_meeting(&fx, "fresh.mp3", "2099-01-01T00:00:00Z");

        let outcome = sweep_once(&fx.db, &now_rfc3339()).unwrap();
        assert_eq!(outcome, SweepOutcome::default());

        assert!(audio_path.exists());
        let conn = fx.db.open().unwrap();
        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert!(record.audio_path.is_some());
    }

    #[test]
    fn test_sweep_is_idempotent() {
        let fx = fixture();
        insert_meeting(&fx, "old.mp3", "2020-01-01T00:00:00Z");

        let first = sweep_once(&fx.db, &now_rfc3339()).unwrap();
        assert_eq!(first.cleared, 1);

        let second = sweep_once(&fx.db, &now_rfc3339()).unwrap();
        assert_eq!(second, SweepOutcome::default());
    }

    #[test]
    fn test_missing_payload_still_clears_reference() {
        let fx = fixture();
        let (id, audio_path) = insert_meeting(&fx, "gone.mp3", "2020-01-01T00:00:00Z");
        std::fs::remove_file(&audio_path).unwrap();

        let outcome = sweep_once(&fx.db, &now_rfc3339()).unwrap();
        assert_eq!(outcome.cleared, 1);

        let conn = fx.db.open().unwrap();
        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert!(record.audio_path.is_none());
    }

    #[test]
    fn test_one_failure_does_not_abort_the_sweep() {
        let fx = fixture();

        // A directory as the payload path makes remove_file fail.
        let blocked_dir = fx.audio_dir.join("blocked.mp3");
        std::fs::create_dir_all(&blocked_dir).unwrap();
        let conn = fx.db.open().unwrap();
        let blocked = MeetingRepository::insert(
            &conn,
            &NewMeeting {
                team_id: "t".to_string(),
                created_by: "u".to_string(),
                title: "blocked".to_string(),
                meeting_at: "2026-01-01T09:00:00Z".to_string(),
                audio_path: Some(blocked_dir.to_string_lossy().to_string()),
                audio_expires_at: Some("2020-01-01T00:00:00Z".to_string()),
            },
        )
        .unwrap();
        drop(conn);

        let (ok_id, ok_path) = insert_meeting(&fx, "old.mp3", "2020-01-01T00:00:00Z");

        let outcome = sweep_once(&fx.db, &now_rfc3339()).unwrap();
        assert_eq!(outcome, SweepOutcome { cleared: 1, failed: 1 });

        // The healthy record was swept despite the earlier failure.
        assert!(!ok_path.exists());
        let conn = fx.db.open().unwrap();
        assert!(MeetingRepository::get(&conn, ok_id)
            .unwrap()
            .unwrap()
            .audio_path
            .is_none());
        // The failed record keeps its reference for the next pass.
        assert!(MeetingRepository::get(&conn, blocked)
            .unwrap()
            .unwrap()
            .audio_path
            .is_some());
    }
}
