//! HTTP front end.
//!
//! **Drawing flow:**
//! - `GET  /`: drawing page
//! - `POST /upload`: form upload (`poligono`, `color`, `myImage`); always redirects to `/`
//!
//! **Dataset export:**
//! - `GET  /prepare`: rebuild `X.npy` / `y.npy` from every stored sample
//! - `GET  /X.npy`, `GET /y.npy`: download the last built artifacts
//!
//! **JSON API:**
//! - `POST /api/samples`: `{shape, color, image}`; failures are reported, not swallowed
//! - `GET  /api/stats`: per-label sample counts
//!
//! **Health:**
//! - `GET  /health`: server status

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Form, FromRequest, Multipart, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::artifacts::{Artifact, Artifacts};
use crate::dataset::{BuildReport, DatasetOptions};
use crate::error::{SketchError, UploadError};
use crate::store::{Backend, SampleStore};
use crate::upload::{self, Upload};

const INDEX_HTML: &str = include_str!("../assets/index.html");

// ── Server state ──────────────────────────────────────────────────────────

/// Everything a request handler needs; built once and shared.
#[derive(Debug)]
pub struct AppState {
    pub store: Arc<dyn SampleStore>,
    pub artifacts: Artifacts,
    pub options: DatasetOptions,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: Arc<dyn SampleStore>, artifacts: Artifacts, options: DatasetOptions) -> Self {
        Self {
            store,
            artifacts,
            options,
            max_upload_bytes: 8 * 1024 * 1024,
        }
    }

    pub fn with_max_upload_bytes(mut self, bytes: usize) -> Self {
        self.max_upload_bytes = bytes;
        self
    }
}

/// Run blocking store or dataset work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: format!("worker task failed: {e}"),
    })
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl From<SketchError> for ApiError {
    fn from(err: SketchError) -> Self {
        let status = match &err {
            SketchError::Upload(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

// ── Form extraction ───────────────────────────────────────────────────────

/// The drawing page's form, posted as multipart or urlencoded.
#[derive(Debug)]
pub struct UploadForm(pub Upload);

#[derive(Debug, Default, Deserialize)]
struct RawForm {
    poligono: Option<String>,
    color: Option<String>,
    #[serde(rename = "myImage")]
    my_image: Option<String>,
}

impl RawForm {
    fn into_upload(self) -> Result<Upload, UploadError> {
        let missing = |field: &str| UploadError::MissingField {
            field: field.to_string(),
        };
        Ok(Upload {
            shape: self.poligono.ok_or_else(|| missing("poligono"))?,
            color: self.color.ok_or_else(|| missing("color"))?,
            image: self.my_image.ok_or_else(|| missing("myImage"))?,
        })
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<RawForm, UploadError> {
    let form_err = |message: String| UploadError::Form { message };
    let mut raw = RawForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| form_err(e.body_text()))?
    {
        let name = field.name().map(str::to_owned);
        let value = field.text().await.map_err(|e| form_err(e.body_text()))?;
        match name.as_deref() {
            Some("poligono") => raw.poligono = Some(value),
            Some("color") => raw.color = Some(value),
            Some("myImage") => raw.my_image = Some(value),
            _ => {}
        }
    }
    Ok(raw)
}

impl<S> FromRequest<S> for UploadForm
where
    S: Send + Sync,
{
    type Rejection = UploadError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        let raw = if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| UploadError::Form {
                    message: e.body_text(),
                })?;
            read_multipart(multipart).await?
        } else {
            let Form(raw) = Form::<RawForm>::from_request(req, state)
                .await
                .map_err(|e| UploadError::Form {
                    message: e.body_text(),
                })?;
            raw
        };
        raw.into_upload().map(UploadForm)
    }
}

// ── Response types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    backend: Backend,
}

#[derive(Serialize)]
struct SampleCreatedResponse {
    id: String,
}

#[derive(Serialize)]
struct LabelCount {
    label: String,
    shape: String,
    color: String,
    count: usize,
}

#[derive(Serialize)]
struct StatsResponse {
    backend: Backend,
    total: usize,
    labels: Vec<LabelCount>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn upload_form(
    State(state): State<Arc<AppState>>,
    form: Result<UploadForm, UploadError>,
) -> Redirect {
    match form {
        Ok(UploadForm(upload)) => {
            let store = Arc::clone(&state.store);
            match blocking(move || upload::accept(store.as_ref(), &upload)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "upload dropped"),
                Err(e) => tracing::warn!(error = %e.message, "upload dropped"),
            }
        }
        Err(e) => tracing::warn!(error = %e, "upload dropped"),
    }
    Redirect::to("/")
}

async fn prepare(State(state): State<Arc<AppState>>) -> Response {
    let result: Result<BuildReport, SketchError> = match blocking(move || {
        state.artifacts.export(state.store.as_ref(), &state.options)
    })
    .await
    {
        Ok(result) => result.map_err(SketchError::from),
        Err(e) => return (e.status, e.message).into_response(),
    };

    match result {
        Ok(report) => format!("OK! {} samples", report.samples).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "dataset export failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response()
        }
    }
}

async fn download(state: Arc<AppState>, artifact: Artifact) -> Response {
    let read = match blocking(move || state.artifacts.read(artifact)).await {
        Ok(read) => read,
        Err(e) => return (e.status, e.message).into_response(),
    };
    match read {
        Ok(Some(bytes)) => {
            let disposition = format!("attachment; filename=\"{}\"", artifact.file_name());
            (
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            format!("{} has not been generated; GET /prepare first", artifact.file_name()),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "artifact read failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("error: {e}")).into_response()
        }
    }
}

async fn download_images(State(state): State<Arc<AppState>>) -> Response {
    download(state, Artifact::Images).await
}

async fn download_labels(State(state): State<Arc<AppState>>) -> Response {
    download(state, Artifact::Labels).await
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.store.backend(),
    })
}

async fn api_create_sample(
    State(state): State<Arc<AppState>>,
    Json(upload): Json<Upload>,
) -> Result<(StatusCode, Json<SampleCreatedResponse>), ApiError> {
    let store = Arc::clone(&state.store);
    let id = blocking(move || upload::accept(store.as_ref(), &upload)).await??;
    Ok((
        StatusCode::CREATED,
        Json(SampleCreatedResponse { id: id.to_string() }),
    ))
}

async fn api_stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let store = Arc::clone(&state.store);
    let index = blocking(move || store.index())
        .await?
        .map_err(SketchError::from)?;
    let labels = index
        .groups()
        .iter()
        .map(|g| LabelCount {
            label: g.labels.dataset_label(),
            shape: g.labels.shape.clone(),
            color: g.labels.color.clone(),
            count: g.samples.len(),
        })
        .collect();
    Ok(Json(StatsResponse {
        backend: state.store.backend(),
        total: index.sample_count(),
        labels,
    }))
}

// ── Router ────────────────────────────────────────────────────────────────

/// All routes, wired to `state`.
pub fn router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        // Drawing flow.
        .route("/", get(index))
        .route("/upload", post(upload_form))
        // Dataset export.
        .route("/prepare", get(prepare))
        .route("/X.npy", get(download_images))
        .route("/y.npy", get(download_labels))
        // JSON API.
        .route("/api/samples", post(api_create_sample))
        .route("/api/stats", get(api_stats))
        // Health.
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serve `app` on `listener` until SIGINT or SIGTERM.
pub async fn serve(listener: tokio::net::TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        tokio::select! {
                            _ = ctrl_c => {},
                            _ = sigterm.recv() => {},
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "SIGTERM handler unavailable; waiting for Ctrl-C only");
                        ctrl_c.await.ok();
                    }
                }
            }
            #[cfg(not(unix))]
            {
                ctrl_c.await.ok();
            }
            tracing::info!("sketchset shutting down");
        })
        .await
}
