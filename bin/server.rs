// CFDI Catalog - Web Server
// JSON API over the catalog importer and the invoice matcher

use anyhow::Context;
use axum::{
    body::{to_bytes, Bytes},
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Request, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use cfdi_catalog::{AppConfig, CatalogError, CatalogImporter, ErrorKind, IngestOptions, InvoiceMatcher, Store};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Largest accepted upload (catalog workbooks can be several MB)
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
struct AppState {
    importer: Arc<CatalogImporter>,
    matcher: Arc<InvoiceMatcher>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

/// Error payload: machine-readable kind plus every detail line
#[derive(Serialize)]
struct ErrorData {
    kind: ErrorKind,
    details: Vec<String>,
}

/// Handler error, rendered as the failure envelope
enum ApiError {
    Catalog(CatalogError),
    BadRequest(String),
    Internal(String),
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        ApiError::Catalog(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, data) = match self {
            ApiError::Catalog(e) => {
                let status = match e.kind() {
                    ErrorKind::InputData => StatusCode::BAD_REQUEST,
                    ErrorKind::Lookup => StatusCode::NOT_FOUND,
                    ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let data = ErrorData {
                    kind: e.kind(),
                    details: e.details(),
                };
                (status, e.to_string(), data)
            }
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                message.clone(),
                ErrorData {
                    kind: ErrorKind::InputData,
                    details: vec![message],
                },
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                message.clone(),
                ErrorData {
                    kind: ErrorKind::Infrastructure,
                    details: vec![message],
                },
            ),
        };

        if status.is_server_error() {
            error!(%message, "request failed");
        }

        let body = ApiResponse {
            success: false,
            data,
            error: Some(message),
        };
        (status, Json(body)).into_response()
    }
}

/// Run synchronous store work off the async executor
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Collect every file part of a multipart body as `(file name, bytes)`
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<(String, Vec<u8>)>, ApiError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        let name = field
            .file_name()
            .or_else(|| field.name())
            .unwrap_or("upload")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        uploads.push((name, bytes.to_vec()));
    }
    Ok(uploads)
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/catalogs - Import one or more catalog workbooks
async fn import_catalogs(State(state): State<AppState>, multipart: Multipart) -> Result<Response, ApiError> {
    let uploads = read_uploads(multipart).await?;
    if uploads.is_empty() {
        return Err(ApiError::BadRequest("no files uploaded".to_string()));
    }

    let importer = state.importer.clone();
    let batch = tokio::task::spawn_blocking(move || importer.ingest_uploads(&uploads))
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?;

    info!(documents = batch.documents.len(), failed = batch.failed_count(), "catalog upload processed");
    Ok(Json(ApiResponse::ok(batch.summaries())).into_response())
}

/// POST /api/cfdi - Match an invoice (multipart file or raw XML body)
async fn match_cfdi(State(state): State<AppState>, request: Request) -> Result<Response, ApiError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let body: Bytes = if is_multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let mut uploads = read_uploads(multipart).await?;
        if uploads.is_empty() {
            return Err(ApiError::BadRequest("no invoice uploaded".to_string()));
        }
        Bytes::from(uploads.swap_remove(0).1)
    } else {
        to_bytes(request.into_body(), MAX_UPLOAD_BYTES)
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let matcher = state.matcher.clone();
    let matched = blocking(move || matcher.process_invoice(&body)).await?;
    Ok(Json(ApiResponse::ok(matched)).into_response())
}

/// GET /api/cfdi/line-items/:contract - Line items under one contract
async fn get_line_items(State(state): State<AppState>, Path(contract): Path<String>) -> Result<Response, ApiError> {
    let matcher = state.matcher.clone();
    let items = blocking(move || matcher.line_items(&contract)).await?;
    Ok(Json(ApiResponse::ok(items)).into_response())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")))
        .init();

    let config = AppConfig::from_env();

    let store = Store::open(&config.database_path)
        .with_context(|| format!("cannot open catalog at {}", config.database_path.display()))?;
    info!(path = %config.database_path.display(), "catalog opened");

    // Create shared state
    let state = AppState {
        importer: Arc::new(CatalogImporter::new(store.clone()).with_options(IngestOptions {
            deadline: config.ingest_timeout,
        })),
        matcher: Arc::new(InvoiceMatcher::new(store)),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/catalogs", post(import_catalogs))
        .route("/cfdi", post(match_cfdi))
        .route("/cfdi/line-items/:contract", get(get_line_items))
        .with_state(state);

    // Build main router
    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "server listening");
    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   API: http://{}/api/health", config.bind_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
