pub mod meetings;
pub mod publish;
pub mod speakers;

use std::path::PathBuf;
use std::sync::Arc;

use crate::db::Database;
use crate::pipeline::{Orchestrator, TaskQueue};

/// Shared state for all routes.
#[derive(Clone)]
pub struct ApiState {
    pub db: Database,
    pub queue: TaskQueue,
    pub orchestrator: Arc<Orchestrator>,
    /// Where uploaded audio payloads are stored.
    pub audio_dir: PathBuf,
    /// Retention window applied to uploaded audio.
    pub audio_retention_days: i64,
    /// Largest accepted upload.
    pub max_upload_bytes: u64,
}
