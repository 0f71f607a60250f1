use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::domain::ImageMatch;
use crate::state_machine::ImageStatus;
use crate::storage::models::{ImageRecord, ImageStatusRecord};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub img_id: String,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub created_at: String,
    pub img_id: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub created_at: String,
    pub error_msg: Option<String>,
    pub img_id: String,
    pub status: ImageStatus,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct MatchesResponse {
    pub img_id: String,
    pub matches: Vec<ImageMatch>,
}

#[derive(Debug, Deserialize)]
pub struct ListImagesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart data: {e}")))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let file_name = field
            .file_name()
            .map(|s| s.to_string())
            .ok_or_else(|| ApiError::bad_request("image field must carry a filename"))?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read image: {e}")))?;

        if data.len() as u64 > state.config.max_upload_size {
            return Err(ApiError::payload_too_large(format!(
                "Image exceeds maximum upload size of {} bytes",
                state.config.max_upload_size
            )));
        }

        upload = Some((file_name, data));
    }

    let (file_name, data) = upload.ok_or_else(|| ApiError::bad_request("image field is required"))?;
    if data.is_empty() {
        return Err(ApiError::bad_request("image must not be empty"));
    }

    let img_id = state.images.upload(data, &file_name).await?;
    Ok(JSend::success(UploadResponse { img_id }))
}

pub async fn list_images(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ListImagesParams>,
) -> Result<Json<JSendPaginated<ImageResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let images = state.images.list()?;
    let total = images.len() as u64;
    let items: Vec<ImageResponse> = images
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(image_to_response)
        .collect();

    Ok(JSend::paginated(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

pub async fn get_image_status(
    State(state): State<Arc<AppState>>,
    Path(img_id): Path<String>,
) -> Result<Json<JSend<StatusResponse>>, ApiError> {
    let record = state.images.status(&img_id)?;
    Ok(JSend::success(status_to_response(&record)))
}

pub async fn process_image(
    State(state): State<Arc<AppState>>,
    Path(img_id): Path<String>,
) -> Result<Json<JSend<StatusResponse>>, ApiError> {
    state.images.trigger(&img_id).await?;

    let record = state.images.status(&img_id)?;
    Ok(JSend::success(status_to_response(&record)))
}

pub async fn get_image_matches(
    State(state): State<Arc<AppState>>,
    Path(img_id): Path<String>,
) -> Result<Json<JSend<MatchesResponse>>, ApiError> {
    let matches = state.images.matches_of(&img_id)?;
    Ok(JSend::success(MatchesResponse { img_id, matches }))
}

// ============================================================================
// Helpers
// ============================================================================

fn image_to_response(image: &ImageRecord) -> ImageResponse {
    ImageResponse {
        created_at: image.created_at.to_rfc3339(),
        img_id: image.img_id.clone(),
    }
}

fn status_to_response(record: &ImageStatusRecord) -> StatusResponse {
    StatusResponse {
        created_at: record.created_at.to_rfc3339(),
        error_msg: record.error_msg.clone(),
        img_id: record.img_id.clone(),
        status: record.status,
        updated_at: record.updated_at.to_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use std::time::Duration;

    use crate::consumer::QueueConsumer;
    use crate::testutil::{face_image, test_context};

    #[tokio::test]
    async fn test_status_of_unknown_image_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(&dir);

        let result = get_image_status(State(ctx.state.clone()), Path("ghost".to_string())).await;
        assert!(matches!(result, Err(ApiError::Fail(code, _)) if code == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_process_match_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(&dir);

        ctx.state
            .images
            .upload(face_image(&[vec![0.0, 0.0]]), "1.jpg")
            .await
            .unwrap();
        ctx.state
            .images
            .upload(face_image(&[vec![0.1, 0.0]]), "2.jpg")
            .await
            .unwrap();

        for img_id in ["1", "2"] {
            let Json(resp) = process_image(State(ctx.state.clone()), Path(img_id.to_string()))
                .await
                .unwrap();
            assert_eq!(resp.data.status, ImageStatus::Queued);
        }

        let again = process_image(State(ctx.state.clone()), Path("1".to_string())).await;
        assert!(matches!(again, Err(ApiError::Fail(code, _)) if code == StatusCode::CONFLICT));

        let consumer = QueueConsumer::new(
            ctx.queue.clone(),
            ctx.engine.clone(),
            10,
            Duration::from_millis(10),
        );
        assert_eq!(consumer.poll_once().await.unwrap(), 2);

        let Json(resp) = get_image_matches(State(ctx.state.clone()), Path("1".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.data.matches.len(), 1);
        assert_eq!(resp.data.matches[0].img_id, "2");

        let Json(resp) = list_images(
            State(ctx.state.clone()),
            AppQuery(ListImagesParams {
                limit: 1,
                offset: 1,
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.data.pagination.total, 2);
        assert_eq!(resp.data.items.len(), 1);
    }

    #[tokio::test]
    async fn test_list_rejects_zero_limit() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(&dir);

        let result = list_images(
            State(ctx.state.clone()),
            AppQuery(ListImagesParams {
                limit: 0,
                offset: 0,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::Fail(code, _)) if code == StatusCode::BAD_REQUEST));
    }
}
