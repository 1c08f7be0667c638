use crate::asset::{Asset, InteractionMethod, NewAsset};
use crate::config::ApiConfig;
use crate::error::AssetError;
use crate::metadata_store::AssetMetadataStore;
use crate::pipeline::{
    IngestRequest, IngestionPipeline, SkippedFile, StagedUpload, UploadedFile, VideoSource,
    WriteMode,
};
use crate::reconcile::{ClearFlags, TextFields};
use crate::replace::ReplaceCoordinator;
use crate::store::object_key;
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestionPipeline>,
    pub records: Arc<dyn AssetMetadataStore>,
    pub coordinator: Arc<ReplaceCoordinator>,
    pub upload_url_expiry: Duration,
}

/// Asset row plus the files that could not be stored
#[derive(Debug, Serialize)]
pub struct AssetResponse {
    #[serde(flatten)]
    pub asset: Asset,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_files: Vec<SkippedFile>,
}

impl From<Asset> for AssetResponse {
    fn from(asset: Asset) -> Self {
        Self {
            asset,
            skipped_files: Vec::new(),
        }
    }
}

/// Request for a presigned staging URL
#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub file_name: String,
}

#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    /// Folder the staged object lives in; pass it back to finalize
    pub folder_id: Uuid,
    /// Object path to reference in the finalize request
    pub path: String,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
}

/// Objects staged through presigned URLs, to be turned into an asset
#[derive(Debug, Deserialize)]
pub struct FinalizeRequest {
    pub object_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub folder_id: Uuid,
    pub zip_path: Option<String>,
    pub marker_image_path: Option<String>,
    pub thumbnail_image_path: Option<String>,
    pub audio_path: Option<String>,
    pub video_path: Option<String>,
    pub interaction_method: Option<InteractionMethod>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig, body_limit: usize) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/assets", post(create_asset))
        .route("/api/v1/assets/replace", post(replace_asset))
        .route("/api/v1/assets/upload-url", post(create_upload_url))
        .route("/api/v1/assets/finalize", post(finalize_upload))
        .route(
            "/api/v1/assets/:asset_id",
            get(get_asset).put(update_asset).delete(delete_asset),
        )
        .route("/api/v1/objects/:object_id/assets", get(list_object_assets))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "asset-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.records.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Create an asset from uploaded files
#[instrument(skip(state, multipart))]
async fn create_asset(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<AssetResponse>), ApiError> {
    let form = AssetForm::read(multipart).await.map_err(error_response)?;

    let object_id = form
        .object_id
        .ok_or_else(|| AssetError::validation("object_id is required"))
        .map_err(error_response)?;
    if form.request.is_empty() {
        return Err(error_response(AssetError::validation(
            "At least one file is required",
        )));
    }

    let folder_id = Uuid::new_v4();
    let outcome = state
        .pipeline
        .ingest(folder_id, form.request, WriteMode::Create)
        .await
        .map_err(error_response)?;

    let asset = state
        .records
        .insert(NewAsset {
            object_id,
            folder_id,
            title: form.text.title,
            description: form.text.description,
            interaction_method: form
                .text
                .interaction_method
                .unwrap_or(InteractionMethod::PlaceOnPlane),
            files: outcome.files,
        })
        .await
        .map_err(error_response)?;

    info!(asset_id = asset.id, folder_id = %folder_id, "Asset created");

    Ok((
        StatusCode::CREATED,
        Json(AssetResponse {
            asset,
            skipped_files: outcome.skipped,
        }),
    ))
}

/// Replace every file of an existing asset
#[instrument(skip(state, multipart))]
async fn replace_asset(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AssetResponse>, ApiError> {
    let form = AssetForm::read(multipart).await.map_err(error_response)?;

    let asset_id = form
        .asset_id
        .ok_or_else(|| AssetError::validation("asset_id is required"))
        .map_err(error_response)?;

    let report = state
        .coordinator
        .replace(asset_id, form.request)
        .await
        .map_err(error_response)?;

    Ok(Json(AssetResponse {
        asset: report.asset,
        skipped_files: report.skipped,
    }))
}

/// Update text fields and media of an asset
#[instrument(skip(state, multipart))]
async fn update_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<AssetResponse>, ApiError> {
    let form = AssetForm::read(multipart).await.map_err(error_response)?;

    let report = state
        .coordinator
        .update(asset_id, form.request, form.clear, form.text)
        .await
        .map_err(error_response)?;

    Ok(Json(AssetResponse {
        asset: report.asset,
        skipped_files: report.skipped,
    }))
}

/// Get a single asset
#[instrument(skip(state))]
async fn get_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
) -> Result<Json<AssetResponse>, ApiError> {
    let asset = state.records.get(asset_id).await.map_err(error_response)?;
    Ok(Json(asset.into()))
}

/// Delete an asset record; its stored files are kept
#[instrument(skip(state))]
async fn delete_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state
        .coordinator
        .delete(asset_id)
        .await
        .map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the assets of one object
#[instrument(skip(state))]
async fn list_object_assets(
    State(state): State<AppState>,
    Path(object_id): Path<i64>,
) -> Result<Json<Vec<Asset>>, ApiError> {
    let assets = state
        .records
        .list_by_object(object_id)
        .await
        .map_err(error_response)?;
    Ok(Json(assets))
}

/// Mint a folder and a presigned URL to stage one file in it
#[instrument(skip(state))]
async fn create_upload_url(
    State(state): State<AppState>,
    Json(request): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let file_name = request.file_name.trim();
    if file_name.is_empty() || file_name.contains(&['/', '\\'][..]) {
        return Err(error_response(AssetError::validation(
            "file_name must be a plain file name",
        )));
    }

    let folder_id = Uuid::new_v4();
    let path = object_key(folder_id, file_name);
    let upload_url = state
        .pipeline
        .store()
        .presign_upload(&path, state.upload_url_expiry)
        .await
        .map_err(|e| error_response(e.into()))?;

    let expires_at = Utc::now()
        + chrono::Duration::from_std(state.upload_url_expiry)
            .unwrap_or_else(|_| chrono::Duration::zero());

    debug!(folder_id = %folder_id, path = %path, "Issued staging URL");

    Ok(Json(UploadUrlResponse {
        folder_id,
        path,
        upload_url,
        expires_at,
    }))
}

/// Turn staged objects into an asset
#[instrument(skip(state, request), fields(folder_id = %request.folder_id))]
async fn finalize_upload(
    State(state): State<AppState>,
    Json(request): Json<FinalizeRequest>,
) -> Result<(StatusCode, Json<AssetResponse>), ApiError> {
    let title = request.title.trim().to_string();
    if title.is_empty() {
        return Err(error_response(AssetError::validation("title is required")));
    }

    let outcome = state
        .pipeline
        .finalize_staged(StagedUpload {
            folder_id: request.folder_id,
            zip_path: request.zip_path,
            marker_image_path: request.marker_image_path,
            thumbnail_image_path: request.thumbnail_image_path,
            audio_path: request.audio_path,
            video_path: request.video_path,
        })
        .await
        .map_err(error_response)?;

    let asset = state
        .records
        .insert(NewAsset {
            object_id: request.object_id,
            folder_id: request.folder_id,
            title: Some(title),
            description: request.description,
            interaction_method: request
                .interaction_method
                .unwrap_or(InteractionMethod::ShowDirectly),
            files: outcome.files,
        })
        .await
        .map_err(error_response)?;

    info!(asset_id = asset.id, "Staged upload finalized");

    Ok((
        StatusCode::CREATED,
        Json(AssetResponse {
            asset,
            skipped_files: outcome.skipped,
        }),
    ))
}

/// Map an [`AssetError`] to its HTTP response
fn error_response(e: AssetError) -> ApiError {
    let status = match e {
        AssetError::Validation(_) => StatusCode::BAD_REQUEST,
        AssetError::AssetNotFound(_) => StatusCode::NOT_FOUND,
        AssetError::Conflict(_) => StatusCode::CONFLICT,
        AssetError::ArchiveFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    metrics::counter!("assets.requests.failed", "code" => e.code()).increment(1);

    // Server side failures carry keys and backend messages; those stay in the logs
    let message = if status.is_server_error() {
        "Internal server error".to_string()
    } else {
        e.to_string()
    };

    if status.is_server_error() {
        error!(error = %e, code = e.code(), "Request failed");
    } else {
        debug!(error = %e, code = e.code(), "Request rejected");
    }

    (
        status,
        Json(ErrorResponse {
            error: message,
            code: e.code().to_string(),
        }),
    )
}

/// Multipart fields shared by the create, replace and update routes
#[derive(Default)]
struct AssetForm {
    asset_id: Option<i64>,
    object_id: Option<i64>,
    text: TextFields,
    clear: ClearFlags,
    request: IngestRequest,
}

impl AssetForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AssetError> {
        let mut form = AssetForm::default();
        let mut video_url = None;

        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "file" | "marker_image" | "thumbnail_image" | "audio_file" | "video_file" => {
                    let file_name = field
                        .file_name()
                        .map(str::to_string)
                        .unwrap_or_else(|| name.clone());
                    let content_type = field.content_type().map(str::to_string);
                    let body = read_field(field.bytes()).await?;

                    // Browsers send empty parts for untouched file inputs
                    if body.is_empty() {
                        continue;
                    }

                    let file = UploadedFile {
                        name: file_name,
                        content_type,
                        body,
                    };
                    match name.as_str() {
                        "file" => form.request.primary = Some(file),
                        "marker_image" => form.request.marker_image = Some(file),
                        "thumbnail_image" => form.request.thumbnail_image = Some(file),
                        "audio_file" => form.request.audio_file = Some(file),
                        _ => form.request.video = Some(VideoSource::Upload(file)),
                    }
                }
                _ => {
                    let value = read_field(field.text()).await?;
                    let value = value.trim();
                    let text = (!value.is_empty()).then(|| value.to_string());

                    match name.as_str() {
                        "asset_id" => form.asset_id = parse_id(&name, value)?,
                        "object_id" => form.object_id = parse_id(&name, value)?,
                        "title" => form.text.title = text,
                        "description" => form.text.description = text,
                        "interaction_method" => {
                            form.text.interaction_method = text
                                .map(|v| v.parse::<InteractionMethod>())
                                .transpose()
                                .map_err(|e| AssetError::validation(e.to_string()))?;
                        }
                        "video_url" => video_url = text,
                        "clear_thumbnail" => form.clear.thumbnail = parse_flag(value),
                        "clear_audio" => form.clear.audio = parse_flag(value),
                        "clear_video" => form.clear.video = parse_flag(value),
                        "clear_model" => form.clear.model = parse_flag(value),
                        other => debug!(field = %other, "Ignoring unknown form field"),
                    }
                }
            }
        }

        // An uploaded video file takes precedence over a link
        if form.request.video.is_none() {
            form.request.video = video_url.map(VideoSource::External);
        } else if video_url.is_some() {
            warn!("Both video_file and video_url sent; keeping the uploaded file");
        }

        Ok(form)
    }
}

async fn read_field<T, E: std::fmt::Display>(
    read: impl Future<Output = Result<T, E>>,
) -> Result<T, AssetError> {
    read.await.map_err(malformed)
}

fn malformed(e: impl std::fmt::Display) -> AssetError {
    AssetError::validation(format!("Malformed multipart body: {e}"))
}

fn parse_id(field: &str, value: &str) -> Result<Option<i64>, AssetError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| AssetError::validation(format!("{field} must be an integer")))
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

/// Start the asset API server
pub async fn start_api_server(state: AppState, config: &ApiConfig, body_limit: usize) -> Result<()> {
    let router = create_router(state, config, body_limit);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting asset API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::build_zip;
    use crate::metadata_store::MemoryMetadataStore;
    use crate::store::{MemoryObjectStore, ObjectStore};
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use bytes::Bytes;
    use tower_service::Service;

    const BOUNDARY: &str = "asset-test-boundary";

    struct TestApp {
        router: Router,
        store: MemoryObjectStore,
    }

    fn app() -> TestApp {
        let store = MemoryObjectStore::new("https://cdn.test");
        let records: Arc<dyn AssetMetadataStore> = Arc::new(MemoryMetadataStore::new());
        let pipeline = Arc::new(IngestionPipeline::new(Arc::new(store.clone()), 1024 * 1024));
        let coordinator = Arc::new(ReplaceCoordinator::new(
            pipeline.clone(),
            records.clone(),
            Duration::from_secs(900),
        ));
        let state = AppState {
            pipeline,
            records,
            coordinator,
            upload_url_expiry: Duration::from_secs(600),
        };
        TestApp {
            router: create_router(state, &ApiConfig::default(), 4 * 1024 * 1024),
            store,
        }
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, Vec<u8>),
    }

    fn multipart(parts: &[Part<'_>]) -> Body {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                            .as_bytes(),
                    );
                }
                Part::File(name, file_name, content) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(content);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let mut router = app.router.clone();
        let response = router.call(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn form_request(method: Method, uri: &str, parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart(parts))
            .unwrap()
    }

    fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn create(app: &TestApp, entries: &[(&str, &str)]) -> serde_json::Value {
        let (status, body) = send(
            app,
            form_request(
                Method::POST,
                "/api/v1/assets",
                &[
                    Part::Text("object_id", "12"),
                    Part::Text("title", "Stone lion"),
                    Part::File("file", "lion.zip", build_zip(entries)),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let app = app();
        let created = create(&app, &[("lion.obj", "o"), ("lion.mtl", "m"), ("thumbnail.png", "p")]).await;

        let folder = created["folder_id"].as_str().unwrap();
        assert_eq!(
            created["model_url"],
            format!("https://cdn.test/{folder}/lion.obj")
        );
        assert_eq!(created["material_urls"].as_array().unwrap().len(), 2);
        assert_eq!(
            created["thumbnail_image_url"],
            format!("https://cdn.test/{folder}/thumbnail.png")
        );
        assert_eq!(created["interaction_method"], "place_on_plane");

        let uri = format!("/api/v1/assets/{}", created["id"]);
        let (status, fetched) = send(
            &app,
            Request::get(uri.as_str()).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["model_url"], created["model_url"]);
    }

    #[tokio::test]
    async fn test_create_requires_object_id() {
        let app = app();
        let (status, body) = send(
            &app,
            form_request(
                Method::POST,
                "/api/v1/assets",
                &[Part::File("file", "a.glb", b"glb".to_vec())],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
        assert!(app.store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_unprocessable() {
        let app = app();
        let (status, body) = send(
            &app,
            form_request(
                Method::POST,
                "/api/v1/assets",
                &[
                    Part::Text("object_id", "1"),
                    Part::File("file", "broken.zip", b"PK nope".to_vec()),
                ],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "ARCHIVE_FORMAT");
    }

    #[tokio::test]
    async fn test_unknown_asset_is_404() {
        let app = app();
        let (status, body) = send(
            &app,
            Request::get("/api/v1/assets/404").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_replace_swaps_files() {
        let app = app();
        let created = create(&app, &[("old.obj", "o"), ("old.mtl", "m")]).await;
        let id = created["id"].to_string();

        let (status, replaced) = send(
            &app,
            form_request(
                Method::POST,
                "/api/v1/assets/replace",
                &[
                    Part::Text("asset_id", &id),
                    Part::File("file", "new.glb", b"glb".to_vec()),
                ],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{replaced}");
        let folder = created["folder_id"].as_str().unwrap();
        assert_eq!(replaced["folder_id"], created["folder_id"]);
        assert_eq!(replaced["generation"], 1);
        assert_eq!(replaced["material_urls"], serde_json::json!([]));
        assert_eq!(app.store.keys(), vec![format!("{folder}/new.glb")]);
    }

    #[tokio::test]
    async fn test_update_clears_and_rejects_model_part() {
        let app = app();
        let created = create(&app, &[("m.obj", "o")]).await;
        let uri = format!("/api/v1/assets/{}", created["id"]);

        let (status, updated) = send(
            &app,
            form_request(
                Method::PUT,
                &uri,
                &[
                    Part::Text("title", "Stone lion, restored"),
                    Part::Text("interaction_method", "show_ar_portal"),
                    Part::Text("clear_audio", "true"),
                    Part::File("audio_file", "guide.mp3", b"mp3".to_vec()),
                    Part::Text("video_url", "https://video.example/lion"),
                ],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK, "{updated}");
        assert_eq!(updated["audio_url"], "");
        assert_eq!(updated["video_url"], "https://video.example/lion");
        assert_eq!(updated["interaction_method"], "show_ar_portal");
        assert_eq!(updated["model_url"], created["model_url"]);
        assert!(!app.store.keys().iter().any(|key| key.contains("audio_")));

        let (status, body) = send(
            &app,
            form_request(
                Method::PUT,
                &uri,
                &[Part::File("file", "other.glb", b"glb".to_vec())],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_server_errors_hide_internal_detail() {
        let app = app();
        app.store.fail_puts_ending_with("statue.glb");

        let (status, body) = send(
            &app,
            form_request(
                Method::POST,
                "/api/v1/assets",
                &[
                    Part::Text("object_id", "7"),
                    Part::File("file", "statue.glb", b"glb".to_vec()),
                ],
            ),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "STORAGE_WRITE");
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_list_object_assets() {
        let app = app();
        let first = create(&app, &[("a.obj", "o")]).await;
        let second = create(&app, &[("b.obj", "o")]).await;

        let (status, listed) = send(
            &app,
            Request::get("/api/v1/objects/12/assets")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let ids: Vec<_> = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|asset| asset["id"].clone())
            .collect();
        assert_eq!(ids, vec![first["id"].clone(), second["id"].clone()]);

        let (status, listed) = send(
            &app,
            Request::get("/api/v1/objects/99/assets")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_delete_asset() {
        let app = app();
        let created = create(&app, &[("a.obj", "o")]).await;
        let uri = format!("/api/v1/assets/{}", created["id"]);

        let (status, body) = send(
            &app,
            Request::delete(uri.as_str()).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, serde_json::Value::Null);

        let (status, _) = send(&app, Request::get(uri.as_str()).body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &app,
            Request::delete(uri.as_str()).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");

        // Files are not cleaned up with the record
        let folder = created["folder_id"].as_str().unwrap();
        assert_eq!(app.store.keys(), vec![format!("{folder}/a.obj")]);
    }

    #[tokio::test]
    async fn test_update_rejects_unknown_interaction_method() {
        let app = app();
        let created = create(&app, &[("m.obj", "o")]).await;
        let uri = format!("/api/v1/assets/{}", created["id"]);

        let (status, body) = send(
            &app,
            form_request(Method::PUT, &uri, &[Part::Text("interaction_method", "hover")]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unknown interaction method: hover");
    }

    #[tokio::test]
    async fn test_staged_upload_flow() {
        let app = app();
        let (status, staged) = send(
            &app,
            json_request(
                "/api/v1/assets/upload-url",
                serde_json::json!({ "file_name": "pagoda.zip" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let folder = staged["folder_id"].as_str().unwrap().to_string();
        let zip_path = staged["path"].as_str().unwrap().to_string();
        assert_eq!(zip_path, format!("{folder}/pagoda.zip"));
        assert!(staged["upload_url"].as_str().unwrap().ends_with(&zip_path));

        // Client-side PUT to the presigned URL
        app.store
            .put(
                &zip_path,
                Bytes::from(build_zip(&[("pagoda.obj", "o"), ("._pagoda.obj", "x")])),
                "application/zip",
                false,
            )
            .await
            .unwrap();

        let (status, asset) = send(
            &app,
            json_request(
                "/api/v1/assets/finalize",
                serde_json::json!({
                    "object_id": 4,
                    "title": "Pagoda",
                    "folder_id": folder,
                    "zip_path": zip_path,
                }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED, "{asset}");
        assert_eq!(
            asset["model_url"],
            format!("https://cdn.test/{folder}/pagoda.obj")
        );
        assert_eq!(asset["interaction_method"], "show_directly");
        assert_eq!(app.store.keys(), vec![format!("{folder}/pagoda.obj")]);
    }

    #[tokio::test]
    async fn test_upload_url_rejects_paths() {
        let app = app();
        let (status, _) = send(
            &app,
            json_request(
                "/api/v1/assets/upload-url",
                serde_json::json!({ "file_name": "../other/x.zip" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = app();
        let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, Request::get("/ready").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "connected");
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("ON"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
