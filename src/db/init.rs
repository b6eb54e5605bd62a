use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::PathBuf;

/// Current UTC time as a fixed-width RFC 3339 string ("...Z"). All stored
/// timestamps use this format so lexicographic comparison in SQL is
/// chronological comparison.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Handle to the SQLite database file. Connections are opened per use (the
/// file is the shared state, not the connection), which also makes temp-file
/// databases trivial in tests.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn at(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn from_global() -> Result<Self> {
        let db_path = crate::global::db_file()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }
        Ok(Self { path: db_path })
    }

    pub fn open(&self) -> Result<Connection> {
        let conn =
            Connection::open(&self.path).context("Failed to open database connection")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        migrate(&conn)?;
        Ok(conn)
    }
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            team_id TEXT NOT NULL,
            created_by TEXT NOT NULL,
            title TEXT NOT NULL,
            meeting_at TEXT NOT NULL,
            audio_path TEXT,
            audio_expires_at TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            error_message TEXT NOT NULL DEFAULT '',
            transcript TEXT NOT NULL DEFAULT '',
            raw_segments TEXT NOT NULL DEFAULT '[]',
            corrected_transcript TEXT NOT NULL DEFAULT '',
            corrected_segments TEXT NOT NULL DEFAULT '[]',
            summary TEXT NOT NULL DEFAULT '',
            wiki_page_id TEXT NOT NULL DEFAULT '',
            wiki_page_url TEXT NOT NULL DEFAULT '',
            chat_message_ts TEXT NOT NULL DEFAULT '',
            chat_channel TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create meetings table")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_status ON meetings(status)",
        [],
    )
    .context("Failed to create meetings status index")?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_audio_expiry \
         ON meetings(audio_expires_at) WHERE audio_path IS NOT NULL",
        [],
    )
    .context("Failed to create meetings expiry index")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS speaker_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            speaker_label TEXT NOT NULL,
            speaker_name TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            UNIQUE(meeting_id, speaker_label)
        )",
        [],
    )
    .context("Failed to create speaker_mappings table")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }

    #[test]
    fn test_now_rfc3339_is_fixed_width_utc() {
        let now = now_rfc3339();
        assert!(now.ends_with('Z'));
        assert_eq!(now.len(), "2026-01-01T00:00:00Z".len());
    }

    #[test]
    fn test_database_handle_reopens_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::at(dir.path().join("test.db"));

        {
            let conn = db.open().unwrap();
            conn.execute(
                "INSERT INTO meetings (team_id, created_by, title, meeting_at, created_at, updated_at)
                 VALUES ('t', 'u', 'm', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
        }

        let conn = db.open().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM meetings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
