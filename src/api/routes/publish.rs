//! Publishing endpoints.
//!
//! Publishing runs on the task queue like every other unit of work; these
//! handlers validate synchronously (meeting exists and is completed), then
//! enqueue. Outcomes land in the stored cross-references, visible via the
//! status endpoint. Publish failures never touch the meeting's status.

use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

use super::ApiState;
use crate::api::error::{ApiError, ApiResult};
use crate::db::{MeetingRecord, MeetingRepository};
use crate::meeting::MeetingStatus;
use crate::pipeline::Task;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/meetings/:id/publish/wiki", post(publish_wiki))
        .route("/meetings/:id/publish/chat", post(publish_chat))
        .route("/meetings/:id/publish/status", get(publish_status))
        .with_state(state)
}

async fn load_completed(state: &ApiState, id: i64) -> ApiResult<MeetingRecord> {
    let db = state.db.clone();
    let record = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        MeetingRepository::get(&conn, id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??
    .ok_or_else(|| ApiError::not_found(format!("meeting {id} not found")))?;

    if record.status != MeetingStatus::Completed {
        return Err(ApiError::bad_request(format!(
            "meeting {id} is {}, only completed meetings can be published",
            record.status.as_str()
        )));
    }
    Ok(record)
}

async fn publish_wiki(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    load_completed(&state, id).await?;
    state
        .queue
        .enqueue(Task::PublishWiki(id))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(json!({
        "message": "Wiki upload started",
        "id": id,
    })))
}

async fn publish_chat(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    load_completed(&state, id).await?;
    state
        .queue
        .enqueue(Task::PublishChat(id))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(json!({
        "message": "Chat share started",
        "id": id,
    })))
}

async fn publish_status(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let record = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        MeetingRepository::get(&conn, id)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??
    .ok_or_else(|| ApiError::not_found(format!("meeting {id} not found")))?;

    Ok(Json(json!({
        "wiki": {
            "published": !record.wiki_page_id.is_empty(),
            "page_id": (!record.wiki_page_id.is_empty()).then_some(&record.wiki_page_id),
            "page_url": (!record.wiki_page_url.is_empty()).then_some(&record.wiki_page_url),
        },
        "chat": {
            "shared": !record.chat_channel.is_empty(),
            "message_ts": (!record.chat_message_ts.is_empty()).then_some(&record.chat_message_ts),
            "channel": (!record.chat_channel.is_empty()).then_some(&record.chat_channel),
        },
    })))
}
