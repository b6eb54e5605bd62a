//! Meeting boundary endpoints.
//!
//! This is deliberately not a full CRUD surface: creation (the upload that
//! triggers processing), status polling, the manual re-entry operations, and
//! deletion. Browsing and editing live in the external record-facing layer.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::info;

use super::ApiState;
use crate::api::error::{ApiError, ApiResult};
use crate::db::{MeetingRepository, NewMeeting, SpeakerMappingRepository};
use crate::meeting::chat_view;
use crate::pipeline::Task;

const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "webm", "mp4"];

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/meetings", post(create_meeting))
        .route("/meetings/:id", get(get_meeting).delete(delete_meeting))
        .route("/meetings/:id/status", get(meeting_status))
        .route("/meetings/:id/transcribe", post(retrigger_transcription))
        .route("/meetings/:id/summarize", post(retrigger_summary))
        .with_state(state)
}

struct CreateRequest {
    title: Option<String>,
    meeting_at: Option<String>,
    team_id: Option<String>,
    created_by: Option<String>,
    audio: Option<(String, Vec<u8>)>,
}

async fn read_create_request(mut multipart: Multipart) -> ApiResult<CreateRequest> {
    let mut request = CreateRequest {
        title: None,
        meeting_at: None,
        team_id: None,
        created_by: None,
        audio: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "title" => request.title = Some(text_field(field).await?),
            "meeting_at" => request.meeting_at = Some(text_field(field).await?),
            "team_id" => request.team_id = Some(text_field(field).await?),
            "created_by" => request.created_by = Some(text_field(field).await?),
            "audio" => {
                let filename = field.file_name().unwrap_or("audio").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}")))?;
                request.audio = Some((filename, bytes.to_vec()));
            }
            _ => {}
        }
    }

    Ok(request)
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed field: {e}")))
}

fn validate_audio(filename: &str, size: usize, max_upload_bytes: u64) -> ApiResult<String> {
    let extension = filename
        .rsplit('.')
        .next()
        .filter(|e| *e != filename)
        .unwrap_or_default()
        .to_lowercase();

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::bad_request(format!(
            "Unsupported audio format '{extension}'; supported: {}",
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    if size as u64 > max_upload_bytes {
        return Err(ApiError::bad_request(format!(
            "Audio upload is {size} bytes, over the {max_upload_bytes} byte limit"
        )));
    }
    Ok(extension)
}

/// Create a meeting record. An audio upload stamps the retention expiry and
/// enqueues processing immediately (upload-triggers-processing, no manual
/// start step); without audio the record stays pending indefinitely.
async fn create_meeting(
    State(state): State<ApiState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = read_create_request(multipart).await?;

    let title = request
        .title
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("title is required"))?;
    let meeting_at = request
        .meeting_at
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("meeting_at is required"))?;
    let team_id = request
        .team_id
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("team_id is required"))?;
    let created_by = request
        .created_by
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::bad_request("created_by is required"))?;

    let mut audio_path = None;
    let mut audio_expires_at = None;

    if let Some((filename, bytes)) = &request.audio {
        let extension = validate_audio(filename, bytes.len(), state.max_upload_bytes)?;

        std::fs::create_dir_all(&state.audio_dir)
            .map_err(|e| ApiError::internal(format!("Failed to create audio dir: {e}")))?;
        let stored = state
            .audio_dir
            .join(format!("{}.{extension}", uuid::Uuid::new_v4()));
        tokio::fs::write(&stored, bytes)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to store audio: {e}")))?;

        audio_path = Some(stored.to_string_lossy().to_string());
        audio_expires_at = Some(
            (Utc::now() + Duration::days(state.audio_retention_days))
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }

    let has_audio = audio_path.is_some();
    let meeting = NewMeeting {
        team_id,
        created_by,
        title,
        meeting_at,
        audio_path,
        audio_expires_at,
    };

    let db = state.db.clone();
    let id = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        MeetingRepository::insert(&conn, &meeting)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    if has_audio {
        state
            .queue
            .enqueue(Task::Process(id))
            .await
            .map_err(|e| ApiError::internal(e.to_string()))?;
        info!("Meeting {id} created with audio, processing enqueued");
    } else {
        info!("Meeting {id} created without audio, staying pending");
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": id,
            "status": "pending",
            "has_audio": has_audio,
        })),
    ))
}

async fn get_meeting(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let (record, mappings) = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        let record = MeetingRepository::get(&conn, id)?;
        let mappings = SpeakerMappingRepository::list(&conn, id)?;
        anyhow::Ok((record, mappings))
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    let record = record.ok_or_else(|| ApiError::not_found(format!("meeting {id} not found")))?;

    // The chat view is derived on every read from (corrected segments ×
    // mappings); it is never stored.
    let view = chat_view(&record.corrected_segments, &mappings);

    Ok(Json(json!({
        "id": record.id,
        "team_id": record.team_id,
        "created_by": record.created_by,
        "title": record.title,
        "meeting_at": record.meeting_at,
        "has_audio": record.has_audio(),
        "audio_expires_at": record.audio_expires_at,
        "status": record.status,
        "status_display": record.status.display(),
        "error_message": record.error_message,
        "transcript": record.transcript,
        "raw_segments": record.raw_segments,
        "corrected_transcript": record.corrected_transcript,
        "corrected_segments": record.corrected_segments,
        "chat_view": view,
        "summary": record.summary,
        "wiki_page_id": record.wiki_page_id,
        "wiki_page_url": record.wiki_page_url,
        "chat_message_ts": record.chat_message_ts,
        "chat_channel": record.chat_channel,
        "speaker_mappings": mappings.iter().map(|m| json!({
            "speaker_label": m.speaker_label,
            "speaker_name": m.speaker_name,
        })).collect::<Vec<_>>(),
        "created_at": record.created_at,
        "updated_at": record.updated_at,
    })))
}

/// Status polling endpoint: `{status, statusDisplay, errorMessage}`.
async fn meeting_status(
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
        "id": record.id,
        "status": record.status,
        "status_display": record.status.display(),
        "error_message": record.error_message,
    })))
}

/// Delete a meeting: record, mappings (cascade), and the audio payload.
/// In-flight stage results for this id are discarded when they try to
/// persist against the missing row.
async fn delete_meeting(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    let db = state.db.clone();
    let audio_path = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        let record = MeetingRepository::get(&conn, id)?;
        let audio_path = record.as_ref().and_then(|r| r.audio_path.clone());
        let deleted = MeetingRepository::delete(&conn, id)?;
        anyhow::Ok(deleted.then_some(audio_path))
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??
    .ok_or_else(|| ApiError::not_found(format!("meeting {id} not found")))?;

    if let Some(path) = audio_path.filter(|p| !p.is_empty()) {
        let _ = tokio::fs::remove_file(&path).await;
    }

    info!("Meeting {id} deleted");
    Ok(Json(json!({ "deleted": true, "id": id })))
}

/// Manual re-entry: discard derived text and re-run from transcription.
/// Rejected with 409 while a run is active.
async fn retrigger_transcription(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    state.orchestrator.retrigger_transcription(id).await?;
    state
        .queue
        .enqueue(Task::Process(id))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(json!({
        "message": "Transcription restarted",
        "id": id,
        "status": "pending",
    })))
}

/// Manual re-entry at the summarizing stage; transcription is not re-run.
async fn retrigger_summary(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
) -> ApiResult<Json<Value>> {
    state.orchestrator.retrigger_summary(id).await?;
    state
        .queue
        .enqueue(Task::Process(id))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(json!({
        "message": "Summary regeneration started",
        "id": id,
        "status": "summarizing",
    })))
}
