//! Service wiring: configuration, providers, worker pool, API server, and
//! the periodic retention trigger.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::api::{ApiServer, ApiState};
use crate::config::Config;
use crate::db::Database;
use crate::global;
use crate::pipeline::{
    Dispatcher, Orchestrator, OrchestratorSettings, RetryPolicy, Task, TaskQueue,
};
use crate::publish::{ChatConnector, PublishConnector, Publisher, WikiConnector};
use crate::retention::RetentionSweeper;
use crate::text::{ChatCompletionClient, OpenAiRefiner, OpenAiSummarizer};
use crate::transcription::OpenAiTranscriber;

const MB: u64 = 1024 * 1024;

pub async fn run_service() -> Result<()> {
    info!("Starting recapd service");

    let config = Config::load()?;
    let db = Database::from_global()?;
    let timeout = Duration::from_secs(config.pipeline.request_timeout_secs);

    let transcriber = Arc::new(
        OpenAiTranscriber::new(&config.providers.transcription, timeout)
            .context("Failed to initialize transcription provider")?,
    );
    let chat_client = Arc::new(
        ChatCompletionClient::new(&config.providers.llm, timeout)
            .context("Failed to initialize llm provider")?,
    );
    let refiner = Arc::new(OpenAiRefiner::new(
        chat_client.clone(),
        config.text.max_input_chars,
    ));
    let summarizer = Arc::new(OpenAiSummarizer::new(
        chat_client,
        config.text.max_input_chars,
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        db.clone(),
        Arc::new(crate::audio::FfmpegSplitter),
        transcriber,
        refiner,
        summarizer,
        OrchestratorSettings {
            compress_threshold_bytes: config.audio.compress_threshold_mb * MB,
            segment_seconds: config.audio.segment_seconds,
            chunk_fanout: config.pipeline.chunk_fanout,
            retry: RetryPolicy {
                max_attempts: config.pipeline.max_retries,
                initial_backoff: Duration::from_secs(config.pipeline.initial_backoff_secs),
                ..RetryPolicy::default()
            },
        },
    ));

    let wiki: Option<Arc<dyn PublishConnector>> = if config.publish.wiki.is_configured() {
        Some(Arc::new(WikiConnector::new(&config.publish.wiki, timeout)?))
    } else {
        info!("Wiki publishing not configured");
        None
    };
    let chat: Option<Arc<dyn PublishConnector>> = if config.publish.chat.is_configured() {
        Some(Arc::new(ChatConnector::new(&config.publish.chat, timeout)?))
    } else {
        info!("Chat publishing not configured");
        None
    };

    let publisher = Arc::new(Publisher::new(db.clone(), wiki, chat));
    let sweeper = Arc::new(RetentionSweeper::new(db.clone()));

    let (queue, rx) = TaskQueue::new(64);
    let dispatcher = Dispatcher::new(
        orchestrator.clone(),
        sweeper,
        publisher,
        config.pipeline.workers,
    );

    let api_server = ApiServer::new(
        config.server.port,
        ApiState {
            db: db.clone(),
            queue: queue.clone(),
            orchestrator,
            audio_dir: global::audio_dir()?,
            audio_retention_days: config.retention.audio_retention_days,
            max_upload_bytes: config.audio.max_upload_mb * MB,
        },
    );
    tokio::spawn(async move {
        if let Err(e) = api_server.start().await {
            error!("API server failed: {}", e);
        }
    });

    recover_in_flight(&db, &queue).await?;
    spawn_sweep_timer(&queue, config.retention.sweep_interval_hours);

    info!("recapd is ready");
    dispatcher.run(rx).await;

    Ok(())
}

/// Re-enqueue records whose run was interrupted by a restart. The persisted
/// status is the single source of truth, so resuming is just delivering the
/// task again.
async fn recover_in_flight(db: &Database, queue: &TaskQueue) -> Result<()> {
    let db = db.clone();
    let ids = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        crate::db::MeetingRepository::in_flight(&conn)
    })
    .await??;

    if !ids.is_empty() {
        info!("Recovering {} interrupted meeting run(s)", ids.len());
    }
    for id in ids {
        queue.enqueue(Task::Process(id)).await?;
    }
    Ok(())
}

/// Timer trigger: one sweep at startup (first tick is immediate), then one
/// per configured period.
fn spawn_sweep_timer(queue: &TaskQueue, interval_hours: u64) {
    let queue = queue.clone();
    let period = Duration::from_secs(interval_hours.max(1) * 3600);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if queue.enqueue(Task::Sweep).await.is_err() {
                break;
            }
        }
    });
}
