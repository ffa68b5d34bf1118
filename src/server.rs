use crate::config::Config;
use crate::pipeline::{JobFailure, JobRequest, Pipeline};
use crate::render::Quality;
use crate::storage::{ArtifactSummary, DebugArtifacts, Diagnostics, JobDir};
use crate::{logi, logw};
use axum::{
    Router,
    body::Body,
    extract::{Json, Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::fs;

const RECENT_ARTIFACTS: usize = 20;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(cfg: Config, client: reqwest::Client) -> Self {
        Self {
            pipeline: Arc::new(Pipeline::new(Arc::new(cfg), client)),
        }
    }

    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: String,
    message: String,
    job_id: Option<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "BadRequest".to_string(),
            message: message.into(),
            job_id: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "NotFound".to_string(),
            message: message.into(),
            job_id: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "InternalError".to_string(),
            message: message.into(),
            job_id: None,
        }
    }
}

impl From<JobFailure> for ApiError {
    fn from(failure: JobFailure) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: failure.error.kind().to_string(),
            message: failure.error.to_string(),
            job_id: failure.job.map(|job| job.id.to_string()),
        }
    }
}

impl From<crate::PipelineError> for ApiError {
    fn from(err: crate::PipelineError) -> Self {
        Self {
            kind: err.kind().to_string(),
            ..Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind,
            "message": self.message,
            "job_id": self.job_id,
        }));
        (self.status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    #[serde(default, alias = "topic")]
    pub prompt: String,
    #[serde(default)]
    pub quality: Option<Quality>,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub features: Vec<&'static str>,
    pub recent: Vec<ArtifactSummary>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/video/{id}", get(video))
        .route("/debug/{id}", get(debug))
        .route("/diagnose/{id}", get(diagnose))
        .with_state(state)
}

async fn video_response(job: &JobDir) -> Result<Response, ApiError> {
    let bytes = match fs::read(job.final_video_path()).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::not_found(format!("job {} has no video", job.id)));
        }
        Err(err) => return Err(ApiError::internal(err.to_string())),
    };

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4");
    let disposition = format!("attachment; filename=\"{}\"", job.download_name());
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        response = response.header(header::CONTENT_DISPOSITION, value);
    }
    response
        .body(Body::from(bytes))
        .map_err(|err| ApiError::internal(err.to_string()))
}

async fn open_job(state: &AppState, id: &str) -> Result<JobDir, ApiError> {
    state
        .pipeline
        .store()
        .open(id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("unknown job {id}")))
}

pub async fn index(State(state): State<AppState>) -> Result<Json<ServiceInfo>, ApiError> {
    let recent = state.pipeline.store().recent(RECENT_ARTIFACTS).await?;
    Ok(Json(ServiceInfo {
        service: "math-explainer",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        features: vec![
            "duration-reconciled scene timing",
            "tiered narration with silence fallback",
            "typed scene programs",
            "per-job diagnostics",
        ],
        recent,
    }))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    let prompt = req.prompt.trim();
    if prompt.is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    logi(format!("POST /generate: {prompt:?}"));

    let request = JobRequest {
        prompt: prompt.to_string(),
        quality: req.quality.unwrap_or_default(),
    };
    let output = state.pipeline.run(&request).await.map_err(|failure| {
        logw(format!("Generation failed: {}", failure.error));
        ApiError::from(failure)
    })?;
    video_response(&output.job).await
}

pub async fn video(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let job = open_job(&state, &id).await?;
    video_response(&job).await
}

pub async fn debug(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DebugArtifacts>, ApiError> {
    let job = open_job(&state, &id).await?;
    Ok(Json(job.debug_artifacts().await))
}

pub async fn diagnose(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Diagnostics>, ApiError> {
    let job = open_job(&state, &id).await?;
    Ok(Json(job.diagnose().await?))
}

/// Binds `cfg.bind_addr` and serves until the process is stopped.
pub async fn serve(cfg: Config) -> anyhow::Result<()> {
    let addr = cfg.bind_addr.clone();
    let client = reqwest::Client::builder().gzip(true).build()?;
    let app = router(AppState::new(cfg, client));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    logi(format!("Listening on http://{addr}"));
    axum::serve(listener, app).await?;
    Ok(())
}
