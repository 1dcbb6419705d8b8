use axum::{
    body::Body,
    extract::{Path, State},
    response::Response,
};
use blob_store::BlobStorageError;
use tracing::debug;

use super::RouteState;
use crate::http_objects::ApiError;

/// Resolve a secure indirection path and stream the object body.
///
/// Tampered, unknown, expired and exhausted paths all produce the same plain
/// 404; nothing about the failure reason leaks to the caller.
#[utoipa::path(
    get,
    path = "/secure/{secure_id}/{timestamp}/{hash}",
    tag = "links",
    responses(
        (status = 200, description = "Object bytes"),
        (status = NOT_FOUND, description = "Not found"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
pub async fn resolve_secure_url(
    Path((secure_id, timestamp, hash)): Path<(String, String, String)>,
    State(state): State<RouteState>,
) -> Result<Response<Body>, ApiError> {
    let resolved = state
        .registry
        .resolve(&secure_id, &timestamp, &hash)
        .await
        .map_err(|e| {
            debug!(secure_id, "secure resolution failed: {e}");
            ApiError::not_found("not found")
        })?;

    let record = state.catalog.get(&resolved.object_key).await;
    let content_type = record
        .as_ref()
        .map(|r| r.content_type.clone())
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let size_bytes = match record.as_ref() {
        Some(r) => r.size_bytes,
        None => {
            // resolvable links can outlive their catalog record; the store
            // still knows the size
            state
                .blob_storage
                .stat(&resolved.object_key)
                .await
                .map_err(|e| match e {
                    BlobStorageError::NotFound(_) => ApiError::not_found("not found"),
                    other => ApiError::internal_error(other),
                })?
                .size_bytes
        }
    };

    let body_stream = state
        .blob_storage
        .get(&resolved.object_key)
        .await
        .map_err(|e| match e {
            BlobStorageError::NotFound(_) => ApiError::not_found("not found"),
            other => ApiError::internal_error(other),
        })?;

    let mut builder = Response::builder()
        .header("Content-Type", content_type)
        .header("Content-Length", size_bytes.to_string())
        .header("Cache-Control", "private, max-age=3600")
        .header("X-Content-Type-Options", "nosniff")
        .header("X-Frame-Options", "DENY");
    if let Some(record) = record {
        builder = builder.header(
            "Content-Disposition",
            format!("inline; filename=\"{}\"", record.original_name),
        );
    }
    builder
        .body(Body::from_stream(body_stream))
        .map_err(|e| ApiError::internal_error(&e.to_string()))
}
