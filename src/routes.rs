use std::{sync::Arc, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Multipart, Path, Request, State},
    http::Method,
    routing::{delete, get, post},
    Json,
    Router,
};
use blob_store::BlobStorage;
use chrono::Utc;
use futures::TryStreamExt;
use nanoid::nanoid;
use secure_links::SecureLinkRegistry;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod secure;
use secure::resolve_secure_url;

use crate::{
    access::LinkIssuer,
    catalog::FileCatalog,
    http_objects::{
        ApiError,
        CreateLinkRequest,
        FileRecord,
        FilesList,
        LinkResponse,
        LinkStatsResponse,
        LinkSummaryItem,
        LinksList,
        Visibility,
    },
};

#[derive(OpenApi)]
#[openapi(
        paths(
            upload_file,
            list_files,
            get_file,
            delete_file,
            create_link,
            list_links,
            link_stats,
            invalidate_link,
            secure::resolve_secure_url,
        ),
        components(
            schemas(
                ApiError,
                FileRecord,
                FilesList,
                Visibility,
                CreateLinkRequest,
                LinkResponse,
                LinkStatsResponse,
                LinkSummaryItem,
                LinksList,
            )
        ),
        tags(
            (name = "sealbox", description = "Sealbox API")
        )
    )]
struct ApiDoc;

#[derive(Clone)]
pub struct RouteState {
    pub blob_storage: Arc<BlobStorage>,
    pub registry: Arc<SecureLinkRegistry>,
    pub catalog: Arc<FileCatalog>,
    pub issuer: Arc<LinkIssuer>,
}

pub fn create_routes(route_state: RouteState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .merge(SwaggerUi::new("/docs/swagger").url("/docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(index))
        .route("/files", post(upload_file).with_state(route_state.clone()))
        .route("/files", get(list_files).with_state(route_state.clone()))
        .route(
            "/files/{key}",
            get(get_file).with_state(route_state.clone()),
        )
        .route(
            "/files/{key}",
            delete(delete_file).with_state(route_state.clone()),
        )
        .route(
            "/files/{key}/links",
            post(create_link).with_state(route_state.clone()),
        )
        .route("/links", get(list_links).with_state(route_state.clone()))
        .route(
            "/links/{secure_id}/stats",
            get(link_stats).with_state(route_state.clone()),
        )
        .route(
            "/links/{secure_id}",
            delete(invalidate_link).with_state(route_state.clone()),
        )
        .route(
            "/secure/{secure_id}/{timestamp}/{hash}",
            get(resolve_secure_url).with_state(route_state.clone()),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    let method = req.method();
                    let uri = req.uri();

                    let matched_path = req
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|matched_path| matched_path.as_str());

                    tracing::debug_span!("request", %method, %uri, matched_path)
                })
                .on_failure(()),
        )
        .layer(cors)
        .layer(DefaultBodyLimit::max(usize::MAX))
}

async fn index() -> &'static str {
    "Sealbox Server"
}

#[allow(dead_code)]
#[derive(utoipa::ToSchema)]
struct UploadFileType {
    #[schema(format = "binary")]
    file: String,
    visibility: Option<String>,
}

/// Upload a file
#[utoipa::path(
    post,
    path = "/files",
    tag = "files",
    request_body(content_type = "multipart/form-data", content = inline(UploadFileType)),
    responses(
        (status = 200, description = "File uploaded", body = FileRecord),
        (status = BAD_REQUEST, description = "No file in request"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
async fn upload_file(
    State(state): State<RouteState>,
    mut form: Multipart,
) -> Result<Json<FileRecord>, ApiError> {
    let mut record: Option<FileRecord> = None;
    let mut visibility = Visibility::Private;
    while let Some(field) = form
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(&e.to_string()))?
    {
        match field.name() {
            Some("file") => {
                let original_name = field
                    .file_name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "unnamed".to_string());
                let content_type = field
                    .content_type()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let key = nanoid!();
                let stream = field.map_err(|e| {
                    blob_store::BlobStorageError::Unavailable(e.to_string())
                });
                let put_result = state
                    .blob_storage
                    .put(&key, Box::pin(stream))
                    .await
                    .map_err(ApiError::internal_error)?;
                record = Some(FileRecord {
                    key,
                    original_name,
                    content_type,
                    size_bytes: put_result.size_bytes,
                    sha256_hash: put_result.sha256_hash,
                    visibility,
                    uploaded_at: Utc::now(),
                });
            }
            Some("visibility") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(&e.to_string()))?;
                visibility = match text.as_str() {
                    "public" => Visibility::Public,
                    "private" => Visibility::Private,
                    other => {
                        return Err(ApiError::bad_request(&format!(
                            "unknown visibility: {other}"
                        )))
                    }
                };
            }
            _ => {}
        }
    }

    let mut record = record.ok_or_else(|| ApiError::bad_request("file field is required"))?;
    // visibility may arrive after the file field
    record.visibility = visibility;
    state.catalog.insert(record.clone()).await;
    info!(key = %record.key, name = %record.original_name, "file uploaded");
    Ok(Json(record))
}

/// List uploaded files, newest first
#[utoipa::path(
    get,
    path = "/files",
    tag = "files",
    responses(
        (status = 200, description = "All uploaded files", body = FilesList),
    ),
)]
async fn list_files(State(state): State<RouteState>) -> Result<Json<FilesList>, ApiError> {
    Ok(Json(FilesList {
        files: state.catalog.list().await,
    }))
}

/// Get one file record
#[utoipa::path(
    get,
    path = "/files/{key}",
    tag = "files",
    responses(
        (status = 200, description = "File record", body = FileRecord),
        (status = NOT_FOUND, description = "No such file")
    ),
)]
async fn get_file(
    Path(key): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<FileRecord>, ApiError> {
    let record = state
        .catalog
        .get(&key)
        .await
        .ok_or_else(|| ApiError::not_found("file not found"))?;
    Ok(Json(record))
}

/// Delete a file and its blob
#[utoipa::path(
    delete,
    path = "/files/{key}",
    tag = "files",
    responses(
        (status = 200, description = "File deleted"),
        (status = NOT_FOUND, description = "No such file"),
        (status = INTERNAL_SERVER_ERROR, description = "Internal Server Error")
    ),
)]
async fn delete_file(
    Path(key): Path<String>,
    State(state): State<RouteState>,
) -> Result<(), ApiError> {
    if !state.catalog.remove(&key).await {
        return Err(ApiError::not_found("file not found"));
    }
    state
        .blob_storage
        .delete(&key)
        .await
        .map_err(ApiError::internal_error)?;
    info!(key, "file deleted");
    Ok(())
}

/// Issue a download link for a file
#[utoipa::path(
    post,
    path = "/files/{key}/links",
    tag = "links",
    request_body = CreateLinkRequest,
    responses(
        (status = 200, description = "Issued link", body = LinkResponse),
        (status = NOT_FOUND, description = "No such file"),
        (status = INTERNAL_SERVER_ERROR, description = "Failed to generate url")
    ),
)]
async fn create_link(
    Path(key): Path<String>,
    State(state): State<RouteState>,
    Json(request): Json<CreateLinkRequest>,
) -> Result<Json<LinkResponse>, ApiError> {
    let record = state
        .catalog
        .get(&key)
        .await
        .ok_or_else(|| ApiError::not_found("file not found"))?;
    let link = state
        .issuer
        .link_for(
            &record,
            request.class,
            request.expiry_secs.map(Duration::from_secs),
            request.max_accesses,
        )
        .await
        .map_err(ApiError::internal_error)?;
    Ok(Json(LinkResponse {
        url: link.url,
        class: request.class,
        expires_at: link.expires_at,
        max_accesses: link.max_accesses,
    }))
}

/// List stored secure link mappings
#[utoipa::path(
    get,
    path = "/links",
    tag = "links",
    responses(
        (status = 200, description = "Stored mappings; expires_at is authoritative over presence", body = LinksList),
    ),
)]
async fn list_links(State(state): State<RouteState>) -> Result<Json<LinksList>, ApiError> {
    let links = state
        .registry
        .list_active()
        .await
        .into_iter()
        .map(LinkSummaryItem::from)
        .collect();
    Ok(Json(LinksList { links }))
}

/// Access statistics for one secure link
#[utoipa::path(
    get,
    path = "/links/{secure_id}/stats",
    tag = "links",
    responses(
        (status = 200, description = "Link statistics", body = LinkStatsResponse),
        (status = NOT_FOUND, description = "No such link")
    ),
)]
async fn link_stats(
    Path(secure_id): Path<String>,
    State(state): State<RouteState>,
) -> Result<Json<LinkStatsResponse>, ApiError> {
    let stats = state
        .registry
        .stats(&secure_id)
        .await
        .ok_or_else(|| ApiError::not_found("link not found"))?;
    Ok(Json(stats.into()))
}

/// Invalidate a secure link
#[utoipa::path(
    delete,
    path = "/links/{secure_id}",
    tag = "links",
    responses(
        (status = 200, description = "Link invalidated"),
        (status = NOT_FOUND, description = "No such link")
    ),
)]
async fn invalidate_link(
    Path(secure_id): Path<String>,
    State(state): State<RouteState>,
) -> Result<(), ApiError> {
    if !state.registry.invalidate(&secure_id).await {
        return Err(ApiError::not_found("link not found"));
    }
    info!(secure_id, "secure link invalidated");
    Ok(())
}
