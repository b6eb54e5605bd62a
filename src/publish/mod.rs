//! Publishing connectors for finished meeting records.
//!
//! Publishing is a side effect keyed off a completed record, independent of
//! the pipeline state machine: it may only be invoked after `completed`,
//! re-publishing overwrites the stored external reference instead of creating
//! duplicates, and a connector failure is reported to the caller but never
//! changes the meeting's status.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::db::{
    Database, MeetingRecord, MeetingRepository, PublishTarget, SpeakerMapping,
    SpeakerMappingRepository,
};
use crate::error::{PipelineError, PipelineResult};
use crate::meeting::MeetingStatus;

pub mod chat;
pub mod wiki;

pub use chat::ChatConnector;
pub use wiki::WikiConnector;

/// Where a connector put the record.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRef {
    pub external_id: String,
    /// Page URL for the wiki, channel for chat.
    pub external_location: String,
}

/// Capability interface over one publishing destination.
#[async_trait]
pub trait PublishConnector: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this record already carries a cross-reference for this
    /// destination.
    fn is_published(&self, record: &MeetingRecord) -> bool;

    async fn publish(
        &self,
        record: &MeetingRecord,
        mappings: &[SpeakerMapping],
    ) -> PipelineResult<PublishRef>;
}

/// Glue between the task queue and the connectors: guards on `completed`,
/// invokes the connector, stores the returned reference.
pub struct Publisher {
    db: Database,
    wiki: Option<Arc<dyn PublishConnector>>,
    chat: Option<Arc<dyn PublishConnector>>,
}

impl Publisher {
    pub fn new(
        db: Database,
        wiki: Option<Arc<dyn PublishConnector>>,
        chat: Option<Arc<dyn PublishConnector>>,
    ) -> Self {
        Self { db, wiki, chat }
    }

    pub async fn publish_wiki(&self, meeting_id: i64) -> PipelineResult<PublishRef> {
        let connector = self.wiki.clone().ok_or_else(|| {
            PipelineError::permanent("wiki publishing is not configured")
        })?;
        self.publish_with(meeting_id, connector, PublishTarget::Wiki)
            .await
    }

    pub async fn publish_chat(&self, meeting_id: i64) -> PipelineResult<PublishRef> {
        let connector = self.chat.clone().ok_or_else(|| {
            PipelineError::permanent("chat publishing is not configured")
        })?;
        self.publish_with(meeting_id, connector, PublishTarget::Chat)
            .await
    }

    async fn publish_with(
        &self,
        meeting_id: i64,
        connector: Arc<dyn PublishConnector>,
        target: PublishTarget,
    ) -> PipelineResult<PublishRef> {
        let conn = self.db.open().map_err(PipelineError::Internal)?;
        let record = MeetingRepository::get(&conn, meeting_id)
            .map_err(PipelineError::Internal)?
            .ok_or_else(|| {
                PipelineError::not_found(format!("meeting {meeting_id} not found"))
            })?;

        if record.status != MeetingStatus::Completed {
            return Err(PipelineError::permanent(format!(
                "meeting {meeting_id} is {}, only completed meetings can be published",
                record.status.as_str()
            )));
        }

        let mappings = SpeakerMappingRepository::list(&conn, meeting_id)
            .map_err(PipelineError::Internal)?;
        drop(conn);

        let reference = connector.publish(&record, &mappings).await?;

        let conn = self.db.open().map_err(PipelineError::Internal)?;
        MeetingRepository::store_publish_ref(
            &conn,
            meeting_id,
            target,
            &reference.external_id,
            &reference.external_location,
        )
        .map_err(PipelineError::Internal)?;

        info!(
            "Meeting {meeting_id} published via {}: {}",
            connector.name(),
            reference.external_location
        );
        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewMeeting;
    use rusqlite::params;

    struct FakeConnector {
        fail: bool,
    }

    #[async_trait]
    impl PublishConnector for FakeConnector {
        fn name(&self) -> &'static str {
            "fake"
        }

        fn is_published(&self, record: &MeetingRecord) -> bool {
            !record.wiki_page_id.is_empty()
        }

        async fn publish(
            &self,
            record: &MeetingRecord,
            _mappings: &[SpeakerMapping],
        ) -> PipelineResult<PublishRef> {
            if self.fail {
                return Err(PipelineError::transient("destination down"));
            }
            Ok(PublishRef {
                external_id: format!("page-{}", record.id),
                external_location: format!("https://wiki.example/pages/{}", record.id),
            })
        }
    }

    fn setup(status: &str) -> (Database, tempfile::TempDir, i64) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::at(dir.path().join("test.db"));
        let conn = db.open().unwrap();
        let id = MeetingRepository::insert(
            &conn,
            &NewMeeting {
                team_id: "t".to_string(),
                created_by: "u".to_string(),
                title: "m".to_string(),
                meeting_at: "2026-01-01T09:00:00Z".to_string(),
                audio_path: None,
                audio_expires_at: None,
            },
        )
        .unwrap();
        conn.execute(
            "UPDATE meetings SET status = ?1, summary = 'sum' WHERE id = ?2",
            params![status, id],
        )
        .unwrap();
        (db, dir, id)
    }

    #[tokio::test]
    async fn test_publish_stores_reference() {
        let (db, _dir, id) = setup("completed");
        let publisher = Publisher::new(
            db.clone(),
            Some(Arc::new(FakeConnector { fail: false })),
            None,
        );

        let reference = publisher.publish_wiki(id).await.unwrap();
        assert_eq!(reference.external_id, format!("page-{id}"));

        let conn = db.open().unwrap();
        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.wiki_page_id, format!("page-{id}"));
        assert_eq!(record.status, MeetingStatus::Completed);
    }

    #[tokio::test]
    async fn test_publish_rejected_before_completed() {
        let (db, _dir, id) = setup("transcribing");
        let publisher = Publisher::new(
            db,
            Some(Arc::new(FakeConnector { fail: false })),
            None,
        );

        let err = publisher.publish_wiki(id).await.unwrap_err();
        assert!(matches!(err, PipelineError::PermanentInput(_)));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_touch_status() {
        let (db, _dir, id) = setup("completed");
        let publisher = Publisher::new(
            db.clone(),
            Some(Arc::new(FakeConnector { fail: true })),
            None,
        );

        assert!(publisher.publish_wiki(id).await.is_err());

        let conn = db.open().unwrap();
        let record = MeetingRepository::get(&conn, id).unwrap().unwrap();
        assert_eq!(record.status, MeetingStatus::Completed);
        assert!(record.wiki_page_id.is_empty());
        assert!(record.error_message.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_connector() {
        let (db, _dir, id) = setup("completed");
        let publisher = Publisher::new(db, None, None);
        assert!(publisher.publish_wiki(id).await.is_err());
        assert!(publisher.publish_chat(id).await.is_err());
    }

    #[tokio::test]
    async fn test_publish_missing_meeting() {
        let (db, _dir, _id) = setup("completed");
        let publisher = Publisher::new(
            db,
            Some(Arc::new(FakeConnector { fail: false })),
            None,
        );
        let err = publisher.publish_wiki(9999).await.unwrap_err();
        assert!(matches!(err, PipelineError::NotFound(_)));
    }
}
