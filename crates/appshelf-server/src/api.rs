use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use appshelf_shared::constants::SUPPORTED_API_VERSIONS;
use appshelf_store::{AppMetadata, AppStorage, AppStorageError};

use crate::auth::{enforce_access, Access, AccessGuard};
use crate::config::ServerConfig;
use crate::error::ServerError;

/// Multipart field carrying the uploaded package.
const UPLOAD_FIELD: &str = "apk_file";

const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

/// Everything but the RFC 5987 `attr-char`s gets percent-encoded.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<AppStorage>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let guard = |access| AccessGuard {
        access,
        config: state.config.clone(),
    };

    let public = Router::new().route("/health", get(health_check));

    let user = Router::new()
        .route("/v1/info", get(instance_info))
        .route("/v1/app-details", get(all_app_details))
        .route("/v1/app-details/:id", get(app_details))
        .route("/v1/app-icon/:id", get(app_icon))
        .route("/v1/download-apk/:id", get(download_apk))
        .route_layer(middleware::from_fn_with_state(guard(Access::User), enforce_access));

    let admin = Router::new()
        .route("/admin/apps", post(add_app))
        .route("/admin/apps/:id", post(update_app).delete(delete_app))
        .route_layer(middleware::from_fn_with_state(guard(Access::Admin), enforce_access));

    // multipart framing on top of the package itself
    let body_limit = state.config.max_upload_size + 64 * 1024;

    Router::new()
        .merge(public)
        .merge(user)
        .merge(admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct InfoResponse {
    app_version: &'static str,
    instance_name: String,
    supported_api_versions: &'static [u32],
}

/// An app as exposed over the API; timestamps are Unix seconds.
#[derive(Debug, Serialize)]
pub struct ApiApp {
    id: i64,
    app_name: String,
    package_name: String,
    version_code: i64,
    version_name: String,
    min_api_level: i64,
    max_api_level: Option<i64>,
    apk_file_size: i64,
    added_timestamp: i64,
    last_updated_timestamp: i64,
}

impl From<AppMetadata> for ApiApp {
    fn from(app: AppMetadata) -> Self {
        Self {
            id: app.id,
            app_name: app.app_name,
            package_name: app.package_name,
            version_code: app.version_code,
            version_name: app.version_name,
            min_api_level: app.min_api_level,
            max_api_level: app.max_api_level,
            apk_file_size: app.apk_file_size,
            added_timestamp: app.added_at.timestamp(),
            last_updated_timestamp: app.last_updated_at.timestamp(),
        }
    }
}

#[derive(Serialize)]
struct UpdateResponse {
    old: ApiApp,
    new: ApiApp,
}

/// Run a storage operation on the blocking pool; every one of them waits on
/// the file lock and does synchronous I/O.
async fn with_storage<T, F>(state: &AppState, op: F) -> Result<T, ServerError>
where
    T: Send + 'static,
    F: FnOnce(&AppStorage) -> Result<T, AppStorageError> + Send + 'static,
{
    let storage = state.storage.clone();
    let result = tokio::task::spawn_blocking(move || op(&storage)).await?;
    Ok(result?)
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn instance_info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        app_version: env!("CARGO_PKG_VERSION"),
        instance_name: state.config.instance_name.clone(),
        supported_api_versions: SUPPORTED_API_VERSIONS,
    })
}

async fn all_app_details(State(state): State<AppState>) -> Result<Json<Vec<ApiApp>>, ServerError> {
    let apps = with_storage(&state, |s| s.list_all()).await?;
    Ok(Json(apps.into_iter().map(ApiApp::from).collect()))
}

async fn app_details(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiApp>, ServerError> {
    let app = with_storage(&state, move |s| s.get_by_id(id)).await?;
    Ok(Json(app.into()))
}

async fn app_icon(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ServerError> {
    let (app, png) = with_storage(&state, move |s| s.read_icon(id)).await?;
    Ok(file_response(png, "image/png", &app.icon_download_name(), false))
}

async fn download_apk(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ServerError> {
    let (app, apk) = with_storage(&state, move |s| s.read_apk(id)).await?;
    Ok(file_response(apk, APK_CONTENT_TYPE, &app.apk_download_name(), true))
}

fn file_response(bytes: Vec<u8>, content_type: &'static str, name: &str, attachment: bool) -> Response {
    let disposition = content_disposition(name, attachment);
    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static(content_type))],
        bytes,
    )
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    response
}

/// `Content-Disposition` with an ASCII fallback name and the exact name in
/// RFC 5987 form.
fn content_disposition(name: &str, attachment: bool) -> String {
    let kind = if attachment { "attachment" } else { "inline" };
    let fallback: String = name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let encoded = utf8_percent_encode(name, ATTR_CHAR);

    format!("{kind}; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

/// Pull the package out of the upload form.
async fn read_upload(mut multipart: Multipart, max: usize) -> Result<Bytes, ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Multipart error: {e}")))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            let data = field
                .bytes()
                .await
                .map_err(|e| ServerError::BadRequest(format!("Failed to read field: {e}")))?;

            if data.len() > max {
                return Err(ServerError::UploadTooLarge {
                    size: data.len(),
                    max,
                });
            }
            return Ok(data);
        }
    }

    Err(ServerError::BadRequest(format!(
        "Missing '{UPLOAD_FIELD}' field in multipart form"
    )))
}

async fn add_app(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<ApiApp>), ServerError> {
    let data = read_upload(multipart, state.config.max_upload_size).await?;
    let size = data.len();

    let app = with_storage(&state, move |s| s.add_upload(&data)).await?;

    info!(id = app.id, package = %app.package_name, size, "App added via API");
    Ok((StatusCode::CREATED, Json(app.into())))
}

async fn update_app(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Json<UpdateResponse>, ServerError> {
    let data = read_upload(multipart, state.config.max_upload_size).await?;

    let (old, new) = with_storage(&state, move |s| s.update_upload(id, &data)).await?;

    info!(id, from = old.version_code, to = new.version_code, "App updated via API");
    Ok(Json(UpdateResponse {
        old: old.into(),
        new: new.into(),
    }))
}

async fn delete_app(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiApp>, ServerError> {
    let app = with_storage(&state, move |s| s.delete(id)).await?;

    info!(id, package = %app.package_name, "App deleted via API");
    Ok(Json(app.into()))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
