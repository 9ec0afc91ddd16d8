use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::features::{FeatureVector, FormAnswers};
use crate::metrics::GaugeRegistry;
use crate::prediction::{PredictError, Prediction, Predictor};
use crate::watcher::ModelReloader;

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "heartwatch::server";

use crate::{log_error, log_info, log_warn};

const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub predictor: Predictor,
    pub reloader: Arc<ModelReloader>,
    /// Bearer secret for `/api/reload`. Unset leaves the endpoint answering 500.
    pub reload_secret: Option<Arc<str>>,
}

/// Either the encoded vector the model consumes or the answers from the
/// intake form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PredictRequest {
    Encoded(FeatureVector),
    Form(FormAnswers),
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    #[error("reload secret is not configured")]
    Unconfigured,
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("model reload failed: {0:#}")]
    Failed(anyhow::Error),
}

impl ReloadError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReloadError::Unconfigured | ReloadError::Failed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ReloadError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PredictError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/predict", post(predict_handler))
        .route("/api/reload", post(reload_handler))
        .with_state(state)
}

/// Served on its own port so scrapes never queue behind prediction traffic.
pub fn metrics_router(gauges: GaugeRegistry) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(gauges)
}

pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("listener has no local address")?;
    log_info!("listening on http://{addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .with_context(|| format!("server on {addr} stopped with an error"))
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    if state.predictor.model().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn predict_handler(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<Prediction>, (StatusCode, Json<ErrorBody>)> {
    let features = match request {
        PredictRequest::Encoded(features) => features,
        PredictRequest::Form(answers) => answers
            .to_feature_vector()
            .map_err(|err| predict_error(err.into()))?,
    };
    state
        .predictor
        .predict(features)
        .await
        .map(Json)
        .map_err(predict_error)
}

async fn reload_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReloadResponse>, (StatusCode, Json<ErrorBody>)> {
    authorize(state.reload_secret.as_deref(), &headers).map_err(|err| {
        log_warn!("rejected reload request: {err}");
        reload_error(err)
    })?;

    match state.reloader.force_reload().await {
        Ok(version) => {
            log_info!("reload endpoint installed version {version}");
            Ok(Json(ReloadResponse { version }))
        }
        Err(err) => {
            log_error!("reload endpoint failed: {err:?}");
            Err(reload_error(ReloadError::Failed(err)))
        }
    }
}

async fn metrics_handler(State(gauges): State<GaugeRegistry>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)],
        gauges.render(),
    )
}

fn authorize(secret: Option<&str>, headers: &HeaderMap) -> Result<(), ReloadError> {
    let secret = secret
        .filter(|secret| !secret.is_empty())
        .ok_or(ReloadError::Unconfigured)?;
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ReloadError::Unauthorized)?;
    if tokens_match(token.trim().as_bytes(), secret.as_bytes()) {
        Ok(())
    } else {
        Err(ReloadError::Unauthorized)
    }
}

// Compares every byte so the response time does not leak the matching prefix.
fn tokens_match(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

fn predict_error(err: PredictError) -> (StatusCode, Json<ErrorBody>) {
    error_response(err.status(), err.to_string())
}

fn reload_error(err: ReloadError) -> (StatusCode, Json<ErrorBody>) {
    error_response(err.status(), err.to_string())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ErrorBody>) {
    (
        status,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}
