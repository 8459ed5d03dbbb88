use axum::extract::{Path, State};
use axum::Json;

use crate::http::error::ApiError;
use crate::http::state::AppState;
use crate::resolver::{StreamRequest, StreamsResponse};

/// GET /stream/{category}/{id}.json
pub async fn serve_stream(
    State(state): State<AppState>,
    Path((category, file)): Path<(String, String)>,
) -> Result<Json<StreamsResponse>, ApiError> {
    let Some(id) = file.strip_suffix(".json") else {
        tracing::warn!("Stream request without .json suffix: {}/{}", category, file);
        return Err(ApiError::bad_request("Invalid parameters."));
    };
    tracing::info!("Stream request for {} with id {}", category, id);

    let request = StreamRequest::parse(&category, id).map_err(|e| {
        tracing::warn!("Rejected stream request {}/{}: {}", category, id, e);
        e
    })?;

    match state.resolver.resolve(&request).await {
        Ok(streams) => Ok(Json(streams)),
        Err(e) => {
            tracing::warn!("Stream request {}/{} failed: {}", category, id, e);
            Err(e.into())
        }
    }
}
