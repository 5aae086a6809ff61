use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{ScanStatusResponse, SubmitResponse};
use crate::routes::error::ApiError;
use crate::services::ingress::IngressError;

/// POST /scan: Upload a medicine photo for identification.
///
/// Multipart fields: `image` (required file) and `request_id` (optional UUID).
pub async fn submit_scan(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let mut multipart = multipart?;
    let mut image: Option<Vec<u8>> = None;
    let mut request_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("image") => image = Some(field.bytes().await?.to_vec()),
            Some("request_id") => request_id = Some(field.text().await?),
            _ => {}
        }
    }

    let image = image.ok_or(IngressError::MissingField("image"))?;

    // Hashing and header parsing are CPU work; keep them off the reactor.
    let scans = state.scans.clone();
    let (request, _admission) =
        tokio::task::spawn_blocking(move || scans.submit(image, request_id.as_deref()))
            .await
            .map_err(|e| ApiError::internal(format!("Submission task failed: {}", e)))??;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            request_id: request.request_id,
            status: request.status,
        }),
    ))
}

/// GET /scan/{request_id}: Poll scan status.
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ScanStatusResponse>, ApiError> {
    let request_id = parse_request_id(&request_id)?;
    let record = state.scans.status(&request_id)?;
    Ok(Json(record.into()))
}

/// DELETE /scan/{request_id}: Cancel a pending or running scan.
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<Json<ScanStatusResponse>, ApiError> {
    let request_id = parse_request_id(&request_id)?;
    let record = state.scans.cancel(&request_id)?;
    Ok(Json(record.into()))
}

fn parse_request_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| IngressError::InvalidRequestId(raw.to_string()).into())
}
