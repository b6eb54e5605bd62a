//! Speaker mapping endpoints.
//!
//! Listing merges the labels actually present in the raw segments with the
//! stored mappings, so labels the provider revealed but nobody has named yet
//! show up with empty names. Updates are batch upserts keyed on
//! (meeting, label).

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ApiState;
use crate::api::error::{ApiError, ApiResult};
use crate::db::{MeetingRepository, SpeakerMappingRepository};
use crate::meeting::distinct_labels;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/meetings/:id/speakers",
            get(list_speakers).patch(update_speakers),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct MappingUpdate {
    speaker_label: String,
    speaker_name: String,
}

#[derive(Debug, Deserialize)]
struct BulkUpdateRequest {
    mappings: Vec<MappingUpdate>,
}

async fn list_speakers(
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

    let mut labels = distinct_labels(&record.raw_segments);
    labels.sort();

    let entries: Vec<Value> = labels
        .iter()
        .map(|label| {
            match mappings.iter().find(|m| &m.speaker_label == label) {
                Some(mapping) => json!({
                    "speaker_label": mapping.speaker_label,
                    "speaker_name": mapping.speaker_name,
                    "created_at": mapping.created_at,
                }),
                None => json!({
                    "speaker_label": label,
                    "speaker_name": "",
                    "created_at": null,
                }),
            }
        })
        .collect();

    Ok(Json(json!({ "speakers": entries })))
}

async fn update_speakers(
    Path(id): Path<i64>,
    State(state): State<ApiState>,
    Json(request): Json<BulkUpdateRequest>,
) -> ApiResult<Json<Value>> {
    if request
        .mappings
        .iter()
        .any(|m| m.speaker_label.is_empty())
    {
        return Err(ApiError::bad_request(
            "each mapping needs a non-empty speaker_label",
        ));
    }

    let db = state.db.clone();
    let mappings = tokio::task::spawn_blocking(move || {
        let conn = db.open()?;
        if MeetingRepository::get(&conn, id)?.is_none() {
            return anyhow::Ok(None);
        }
        for mapping in &request.mappings {
            SpeakerMappingRepository::upsert(
                &conn,
                id,
                &mapping.speaker_label,
                &mapping.speaker_name,
            )?;
        }
        Ok(Some(SpeakerMappingRepository::list(&conn, id)?))
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??
    .ok_or_else(|| ApiError::not_found(format!("meeting {id} not found")))?;

    let entries: Vec<Value> = mappings
        .iter()
        .map(|m| {
            json!({
                "speaker_label": m.speaker_label,
                "speaker_name": m.speaker_name,
                "created_at": m.created_at,
            })
        })
        .collect();

    Ok(Json(json!({ "speakers": entries })))
}
