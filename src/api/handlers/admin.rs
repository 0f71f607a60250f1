use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::state_machine::ImageStatus;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct RequeueResponse {
    pub img_id: String,
    /// State the image was reset from
    pub previous_status: ImageStatus,
    pub status: ImageStatus,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub feature_mappings_deleted: u64,
    pub images_deleted: u64,
    pub matches_deleted: u64,
    pub queued_messages_deleted: u64,
    pub statuses_deleted: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Recovery for images stuck in a non-terminal state
pub async fn requeue_image(
    State(state): State<Arc<AppState>>,
    Path(img_id): Path<String>,
) -> Result<Json<JSend<RequeueResponse>>, ApiError> {
    let previous_status = state.images.requeue(&img_id).await?;

    Ok(JSend::success(RequeueResponse {
        img_id,
        previous_status,
        status: ImageStatus::Queued,
    }))
}

pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let stats = state
        .db
        .purge_all()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::warn!(
        statuses = stats.statuses,
        images = stats.images,
        matches = stats.matches,
        "Purged all data"
    );

    Ok(JSend::success(PurgeResponse {
        feature_mappings_deleted: stats.feature_mappings,
        images_deleted: stats.images,
        matches_deleted: stats.matches,
        queued_messages_deleted: stats.queued_messages,
        statuses_deleted: stats.statuses,
    }))
}
