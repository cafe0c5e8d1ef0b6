use crate::catalog::{find_title, load_catalog};
use crate::classify::count_by_type;
use crate::config::HttpServerConfig;
use crate::context::AppContext;
use crate::error::{ComicdeskError, Result};
use crate::server::views::render_dashboard;
use crate::submit::{submit_title, TitleSubmission};
use crate::upload::{
    create_unit, register_unit_from_storage, upload_new_title, NewTitleUpload, TitleHandoff, UnitRequest,
    UploadFile,
};
use axum::{
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Uploads arrive base64-encoded inside JSON, so allow large bodies
const MAX_BODY_BYTES: usize = 512 * 1024 * 1024;

/// How long an upload waits for its metadata before it is forgotten
const HANDOFF_TTL_HOURS: i64 = 24;

/// Check if a port is available by attempting to bind to it
async fn check_port_available(port: u16) -> bool {
    tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await.is_ok()
}

/// HTTP dashboard server
pub struct DashboardServer {
    ctx: Arc<AppContext>,
    api_key: String,
    allowed_origins: Vec<String>,
    authless: bool,
}

impl DashboardServer {
    pub fn new(ctx: AppContext, config: &HttpServerConfig) -> Result<Self> {
        // API key is optional if authless mode is enabled
        let api_key = if config.authless {
            String::new()
        } else {
            std::env::var(&config.api_key_env).map_err(|_| {
                ComicdeskError::Config(format!(
                    "Environment variable {} not set. Set it in your .env file or as an environment variable, or enable authless mode.",
                    config.api_key_env
                ))
            })?
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            api_key,
            allowed_origins: config.allowed_origins.clone(),
            authless: config.authless,
        })
    }

    /// Run the HTTP server
    pub async fn run(&self, port: u16) -> Result<()> {
        let app = self.router();
        let addr = format!("127.0.0.1:{}", port);

        if !check_port_available(port).await {
            return Err(ComicdeskError::Config(format!(
                "Port {} is already in use. Stop the other process or set http_server.port in config.toml",
                port
            )));
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            ComicdeskError::Io(std::io::Error::new(
                std::io::ErrorKind::AddrInUse,
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;

        log::info!("Dashboard listening on http://{}", addr);
        if self.authless {
            log::warn!("Authless mode: /api routes accept requests without an API key");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| {
                ComicdeskError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("HTTP server error: {}", e),
                ))
            })?;

        self.ctx.shutdown().await
    }

    /// Create the axum router
    pub fn router(&self) -> Router {
        let state = AppState {
            ctx: Arc::clone(&self.ctx),
            api_key: self.api_key.clone(),
            allowed_origins: self.allowed_origins.clone(),
            authless: self.authless,
            pending: Arc::new(Mutex::new(HashMap::new())),
        };

        // Restrict CORS to the configured origins so preflight matches enforcement
        let cors = if self.allowed_origins.is_empty() {
            CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
        } else {
            let origins: Vec<axum::http::HeaderValue> = self
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        };

        let api = Router::new()
            .route("/catalog", get(handle_catalog))
            .route("/stats", get(handle_stats))
            .route("/titles/:id", get(handle_title).put(handle_submit_title))
            .route("/titles/:id/units", post(handle_create_unit))
            .route("/titles/:id/units/from-storage", post(handle_units_from_storage))
            .route("/uploads", post(handle_new_title_upload))
            .route("/uploads/:id", get(handle_pending_upload))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_operator));

        let mut router = Router::new()
            .route("/", get(handle_dashboard))
            .route("/health", get(handle_health))
            .nest("/api", api);

        if let Some(root) = self.ctx.media_root() {
            router = router.nest_service("/media", ServeDir::new(root));
        }

        router
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors)
                    .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
            )
            .with_state(state)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received, draining connections");
}

/// An upload-step result waiting for its metadata
#[derive(Debug, Clone)]
struct PendingHandoff {
    handoff: TitleHandoff,
    expires_at: DateTime<Utc>,
}

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    ctx: Arc<AppContext>,
    api_key: String,
    allowed_origins: Vec<String>,
    authless: bool,
    /// Upload-step results waiting for their metadata, keyed by title id
    pending: Arc<Mutex<HashMap<String, PendingHandoff>>>,
}

impl AppState {
    /// Locks the map, recovering it after a poison, and drops expired entries
    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingHandoff>> {
        let mut pending = self.pending.lock().unwrap_or_else(|poisoned| {
            log::warn!("Pending upload map was poisoned, recovering");
            poisoned.into_inner()
        });
        let now = Utc::now();
        pending.retain(|title_id, entry| {
            let live = entry.expires_at > now;
            if !live {
                log::info!("Dropping pending upload for '{}': metadata never arrived", title_id);
            }
            live
        });
        pending
    }

    fn pending_handoff(&self, title_id: &str) -> Option<TitleHandoff> {
        self.pending().get(title_id).map(|entry| entry.handoff.clone())
    }

    fn store_handoff(&self, handoff: TitleHandoff) {
        let entry = PendingHandoff {
            expires_at: Utc::now() + Duration::hours(HANDOFF_TTL_HOURS),
            handoff,
        };
        self.pending().insert(entry.handoff.title_id.clone(), entry);
    }

    fn take_handoff(&self, title_id: &str) {
        self.pending().remove(title_id);
    }
}

/// Error body returned by every `/api` route
struct ApiError(ComicdeskError);

impl From<ComicdeskError> for ApiError {
    fn from(e: ComicdeskError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ComicdeskError::Validation(_) => StatusCode::BAD_REQUEST,
            ComicdeskError::NotFound(_) => StatusCode::NOT_FOUND,
            ComicdeskError::HandoffMissing(_) => StatusCode::CONFLICT,
            ComicdeskError::UploadBatch { .. }
            | ComicdeskError::Storage(_)
            | ComicdeskError::Documents(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match self.0 {
            ComicdeskError::Validation(m) | ComicdeskError::NotFound(m) | ComicdeskError::HandoffMissing(m) => m,
            other => {
                log::error!("Request failed: {}", other);
                other.to_string()
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// A file in a JSON upload body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePayload {
    name: String,
    #[serde(default)]
    content_type: Option<String>,
    /// Base64 (standard alphabet) file contents
    data: String,
}

impl FilePayload {
    fn decode(self) -> Result<UploadFile> {
        let bytes = STANDARD
            .decode(self.data.trim())
            .map_err(|e| ComicdeskError::Validation(format!("File '{}' is not valid base64: {}", self.name, e)))?;
        let mut file = UploadFile::new(&self.name, bytes);
        if let Some(content_type) = self.content_type {
            file.content_type = content_type;
        }
        Ok(file)
    }
}

fn decode_all(files: Vec<FilePayload>) -> Result<Vec<UploadFile>> {
    files.into_iter().map(FilePayload::decode).collect()
}

#[derive(Debug, Deserialize)]
struct UnitUploadBody {
    title: String,
    #[serde(default)]
    files: Vec<FilePayload>,
}

#[derive(Debug, Deserialize)]
struct FromStorageBody {
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewTitleBody {
    title_id: String,
    #[serde(default)]
    cover: Option<FilePayload>,
    #[serde(default)]
    banner: Option<FilePayload>,
    #[serde(default)]
    units: Vec<Vec<FilePayload>>,
}

/// Gate for `/api` routes: bearer key and origin check unless authless
async fn require_operator(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.authless {
        if let Err(response) = validate_auth(request.headers(), &state.api_key) {
            return response;
        }
        if let Err(response) = validate_origin(request.headers(), &state.allowed_origins) {
            return response;
        }
    }
    next.run(request).await
}

async fn handle_dashboard(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let counts = count_by_type(&state.ctx).await?;
    let catalog = load_catalog(&state.ctx).await?;
    Ok(Html(render_dashboard(&counts, &catalog, state.ctx.layout.unit_kind)))
}

async fn handle_health() -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "comicdesk",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
        .into_response()
}

async fn handle_catalog(State(state): State<AppState>) -> ApiResult<Response> {
    let catalog = load_catalog(&state.ctx).await?;
    Ok(Json(catalog).into_response())
}

async fn handle_title(State(state): State<AppState>, Path(title_id): Path<String>) -> ApiResult<Response> {
    let catalog = load_catalog(&state.ctx).await?;
    let title = find_title(&catalog, title_id.trim())
        .ok_or_else(|| ComicdeskError::NotFound(format!("Title '{}' is not in the catalog", title_id.trim())))?;
    Ok(Json(title).into_response())
}

async fn handle_stats(State(state): State<AppState>) -> ApiResult<Response> {
    let counts = count_by_type(&state.ctx).await?;
    Ok(Json(counts).into_response())
}

async fn handle_create_unit(
    State(state): State<AppState>,
    Path(title_id): Path<String>,
    Json(body): Json<UnitUploadBody>,
) -> ApiResult<Response> {
    let files = decode_all(body.files)?;
    let outcome = create_unit(
        &state.ctx,
        UnitRequest {
            title_id,
            unit_title: body.title,
            files,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

async fn handle_units_from_storage(
    State(state): State<AppState>,
    Path(title_id): Path<String>,
    Json(body): Json<FromStorageBody>,
) -> ApiResult<Response> {
    let (doc_id, unit) = register_unit_from_storage(&state.ctx, &title_id, &body.title).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "docId": doc_id, "unit": unit })),
    )
        .into_response())
}

async fn handle_new_title_upload(
    State(state): State<AppState>,
    Json(body): Json<NewTitleBody>,
) -> ApiResult<Response> {
    let request = NewTitleUpload {
        title_id: body.title_id,
        cover: body.cover.map(FilePayload::decode).transpose()?,
        banner: body.banner.map(FilePayload::decode).transpose()?,
        units: body.units.into_iter().map(decode_all).collect::<Result<Vec<_>>>()?,
    };

    let outcome = upload_new_title(&state.ctx, request).await?;
    state.store_handoff(outcome.handoff.clone());
    Ok((StatusCode::CREATED, Json(outcome)).into_response())
}

async fn handle_pending_upload(
    State(state): State<AppState>,
    Path(title_id): Path<String>,
) -> ApiResult<Response> {
    let title_id = title_id.trim();
    let handoff = state.pending_handoff(&title_id).ok_or_else(|| {
        ComicdeskError::NotFound(format!(
            "No pending upload for '{}'. Please upload images first.",
            title_id
        ))
    })?;
    Ok(Json(handoff).into_response())
}

async fn handle_submit_title(
    State(state): State<AppState>,
    Path(title_id): Path<String>,
    Json(mut submission): Json<TitleSubmission>,
) -> ApiResult<Response> {
    let title_id = title_id.trim();
    submission.id = title_id.to_string();
    if let Some(handoff) = state.pending_handoff(title_id) {
        submission = submission.with_handoff(&handoff);
    }

    let record = submit_title(&state.ctx, &submission).await?;
    state.take_handoff(title_id);
    Ok(Json(record).into_response())
}

/// Validate Authorization header
fn validate_auth(headers: &HeaderMap, expected_key: &str) -> std::result::Result<(), Response> {
    let auth_header = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({
                    "error": "Missing Authorization header. Use 'Authorization: Bearer <api-key>'"
                })),
            )
                .into_response()
        })?;

    match auth_header.strip_prefix("Bearer ") {
        Some(provided) if provided == expected_key => Ok(()),
        Some(_) => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Invalid API key" })),
        )
            .into_response()),
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "error": "Invalid Authorization header format. Use 'Authorization: Bearer <api-key>'"
            })),
        )
            .into_response()),
    }
}

/// Validate Origin header (prevents DNS rebinding attacks)
fn validate_origin(headers: &HeaderMap, allowed_origins: &[String]) -> std::result::Result<(), Response> {
    if allowed_origins.is_empty() {
        return Ok(());
    }

    // No origin header means a direct request, not a browser
    let origin = match headers.get("origin").and_then(|h| h.to_str().ok()) {
        Some(o) => o,
        None => return Ok(()),
    };

    if allowed_origins.iter().any(|allowed| origin == allowed) {
        Ok(())
    } else {
        Err((
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({
                "error": format!("Origin '{}' is not in the allowed origins list", origin)
            })),
        )
            .into_response())
    }
}
