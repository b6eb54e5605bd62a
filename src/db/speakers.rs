//! Speaker mapping persistence.
//!
//! One row per (meeting, provider speaker label). Rows are seeded with empty
//! names as soon as raw segments reveal a label and filled in only by the
//! explicit batch-mapping call; they live and die with their meeting
//! (FK cascade).

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::init::now_rfc3339;

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerMapping {
    pub id: i64,
    pub meeting_id: i64,
    pub speaker_label: String,
    pub speaker_name: String,
    pub created_at: String,
}

pub struct SpeakerMappingRepository;

impl SpeakerMappingRepository {
    /// Create empty-name rows for labels that do not have one yet. Existing
    /// mappings (including user-assigned names) are left alone.
    pub fn seed_labels<'a>(
        conn: &Connection,
        meeting_id: i64,
        labels: impl IntoIterator<Item = &'a str>,
    ) -> Result<usize> {
        let now = now_rfc3339();
        let mut created = 0;
        for label in labels {
            if label.is_empty() {
                continue;
            }
            created += conn
                .execute(
                    "INSERT OR IGNORE INTO speaker_mappings \
                     (meeting_id, speaker_label, speaker_name, created_at) \
                     VALUES (?1, ?2, '', ?3)",
                    params![meeting_id, label, now],
                )
                .context("Failed to seed speaker label")?;
        }
        Ok(created)
    }

    /// Set (or overwrite) the display name for one label.
    pub fn upsert(
        conn: &Connection,
        meeting_id: i64,
        speaker_label: &str,
        speaker_name: &str,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO speaker_mappings (meeting_id, speaker_label, speaker_name, created_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(meeting_id, speaker_label) DO UPDATE SET speaker_name = ?3",
            params![meeting_id, speaker_label, speaker_name, now_rfc3339()],
        )
        .context("Failed to upsert speaker mapping")?;
        Ok(())
    }

    /// All mappings for a meeting, ordered by label.
    pub fn list(conn: &Connection, meeting_id: i64) -> Result<Vec<SpeakerMapping>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, meeting_id, speaker_label, speaker_name, created_at \
                 FROM speaker_mappings WHERE meeting_id = ?1 ORDER BY speaker_label",
            )
            .context("Failed to prepare speaker mappings query")?;

        let mappings = stmt
            .query_map(params![meeting_id], |row| {
                Ok(SpeakerMapping {
                    id: row.get(0)?,
                    meeting_id: row.get(1)?,
                    speaker_label: row.get(2)?,
                    speaker_name: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })
            .context("Failed to query speaker mappings")?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::migrate;
    use crate::db::meetings::{MeetingRepository, NewMeeting};

    fn setup() -> (Connection, i64) {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        migrate(&conn).unwrap();
        let id = MeetingRepository::insert(
            &conn,
            &NewMeeting {
                team_id: "t".to_string(),
                created_by: "u".to_string(),
                title: "m".to_string(),
                meeting_at: "2026-08-07T09:00:00Z".to_string(),
                audio_path: None,
                audio_expires_at: None,
            },
        )
        .unwrap();
        (conn, id)
    }

    #[test]
    fn test_seed_creates_empty_names_once() {
        let (conn, meeting_id) = setup();

        let created =
            SpeakerMappingRepository::seed_labels(&conn, meeting_id, ["Speaker 0", "Speaker 1"])
                .unwrap();
        assert_eq!(created, 2);

        // Seeding again is a no-op.
        let created =
            SpeakerMappingRepository::seed_labels(&conn, meeting_id, ["Speaker 0", "Speaker 1"])
                .unwrap();
        assert_eq!(created, 0);

        let mappings = SpeakerMappingRepository::list(&conn, meeting_id).unwrap();
        assert_eq!(mappings.len(), 2);
        assert!(mappings.iter().all(|m| m.speaker_name.is_empty()));
    }

    #[test]
    fn test_seed_does_not_clobber_assigned_names() {
        let (conn, meeting_id) = setup();
        SpeakerMappingRepository::upsert(&conn, meeting_id, "Speaker 0", "Dana").unwrap();

        SpeakerMappingRepository::seed_labels(&conn, meeting_id, ["Speaker 0"]).unwrap();

        let mappings = SpeakerMappingRepository::list(&conn, meeting_id).unwrap();
        assert_eq!(mappings[0].speaker_name, "Dana");
    }

    #[test]
    fn test_upsert_overwrites_name() {
        let (conn, meeting_id) = setup();
        SpeakerMappingRepository::upsert(&conn, meeting_id, "Speaker 0", "Dana").unwrap();
        SpeakerMappingRepository::upsert(&conn, meeting_id, "Speaker 0", "Dana K.").unwrap();

        let mappings = SpeakerMappingRepository::list(&conn, meeting_id).unwrap();
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].speaker_name, "Dana K.");
    }

    #[test]
    fn test_mappings_deleted_with_meeting() {
        let (conn, meeting_id) = setup();
        SpeakerMappingRepository::upsert(&conn, meeting_id, "Speaker 0", "Dana").unwrap();

        MeetingRepository::delete(&conn, meeting_id).unwrap();

        let mappings = SpeakerMappingRepository::list(&conn, meeting_id).unwrap();
        assert!(mappings.is_empty());
    }

    #[test]
    fn test_empty_label_skipped() {
        let (conn, meeting_id) = setup();
        let created = SpeakerMappingRepository::seed_labels(&conn, meeting_id, [""]).unwrap();
        assert_eq!(created, 0);
    }
}
