use axum::extract::{Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::medicine::MedicineDetail;
use crate::routes::error::ApiError;

/// GET /medicine/{medicine_id}: Full detail for an identified medicine.
pub async fn get_medicine(
    State(state): State<AppState>,
    Path(medicine_id): Path<String>,
) -> Result<Json<MedicineDetail>, ApiError> {
    let detail = state.directory.detail(&medicine_id).await?;
    Ok(Json(detail))
}
