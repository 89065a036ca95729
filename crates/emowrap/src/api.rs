//! Recording endpoints used by the experiment frontend.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use cortex_session::{
    ClientFactory, ControllerSnapshot, ExportSettings, LogLayout, ParamsStore, Readiness,
    RecordRegistry, SessionController, SessionParameters, StimulusSequence, SubjectName,
};
use emoconf::EmoConfig;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: RecordRegistry,
    pub factory: Arc<dyn ClientFactory>,
    pub params_store: ParamsStore,
    pub log_layout: LogLayout,
    pub config: Arc<EmoConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: EmoConfig, factory: Arc<dyn ClientFactory>) -> Self {
        let paths = &config.infra.paths;
        Self {
            registry: RecordRegistry::new(),
            factory,
            params_store: ParamsStore::new(&paths.data_dir),
            log_layout: LogLayout::new(&paths.log_dir),
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    fn ready_timeout(&self) -> Duration {
        self.config.ready_timeout()
    }

    /// Turn a start request into validated session parameters.
    fn session_parameters(&self, req: StartRequest) -> Result<SessionParameters, ApiError> {
        let recording = &self.config.bootstrap.recording;
        let export = ExportSettings::from_config(&self.config.infra.paths.export_dir, recording);
        let subject = SubjectName::new(req.subject_name)?;

        let mut params = SessionParameters::new(subject, req.run_id, export, recording);
        params.duration = Duration::from_secs(req.duration);
        params.sequence = req.sequence;
        params.cursor_delay = req.cursor_delay.unwrap_or_default();
        params.word_delay = req.word_delay.unwrap_or_default();
        params.common_event_time = req.common_event_time;
        params.headset_id = req
            .headset_id
            .filter(|id| !id.trim().is_empty())
            .or_else(|| self.config.bootstrap.cortex.wanted_headset().map(String::from));

        params.validate()?;
        Ok(params)
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/start_recording", post(start_recording))
        .route("/stop_recording", post(stop_recording))
        .route("/save_log", post(save_log))
        .route("/recordings", get(list_recordings))
        .route("/recordings/{run_id}", get(get_recording))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Seconds. Zero (the default) records until a stop request.
    #[serde(default)]
    pub duration: u64,
    pub subject_name: String,
    pub run_id: i64,
    #[serde(default)]
    pub sequence: StimulusSequence,
    /// Missing or null (the frontend sends null for NaN) counts as zero.
    #[serde(default)]
    pub cursor_delay: Option<f64>,
    #[serde(default)]
    pub word_delay: Option<f64>,
    #[serde(default)]
    pub common_event_time: Option<String>,
    #[serde(default)]
    pub headset_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StopRequest {
    pub subject_name: String,
    pub run_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SaveLogRequest {
    pub subject_name: String,
    pub run_id: i64,
    pub log_data: String,
}

/// Liveness plus a count of registered recordings.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "active_recordings": state.registry.len(),
    }))
}

/// Register a controller, persist its parameters, start it and wait for
/// the headset to confirm the session.
pub async fn start_recording(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let params = state.session_parameters(req)?;
    let run_id = params.run_id;

    let client = state.factory.create(&params);
    let controller = SessionController::new(params, client, &state.log_layout);
    state.registry.insert(Arc::clone(&controller))?;

    if let Err(e) = state.params_store.save(controller.params()) {
        state.registry.remove_if_same(&controller);
        return Err(e.into());
    }

    state.registry.reap_when_finished(Arc::clone(&controller));
    controller.start()?;

    match controller.gate().wait(state.ready_timeout()).await {
        Some(Readiness::Ready) => {
            info!(run_id, subject = %controller.params().subject_name, "recording started");
            Ok(Json(json!({ "status": "Recording started" })))
        }
        Some(Readiness::Failed(message)) => Err(ApiError::Headset(message)),
        None => {
            controller.abandon("Headset not found").await;
            Err(ApiError::HeadsetNotFound)
        }
    }
}

pub async fn stop_recording(
    State(state): State<AppState>,
    payload: Result<Json<StopRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let controller = state
        .registry
        .get(req.run_id)
        .filter(|c| c.params().subject_name.as_str() == req.subject_name)
        .ok_or(ApiError::RecordNotFound)?;

    let outcome = controller.stop_record().await?;
    info!(run_id = req.run_id, ?outcome, "stop requested");
    Ok(Json(json!({ "status": "Record stopped successfully" })))
}

/// Append one frontend line to the subject/run log. Works whether or not
/// a recording is active for that run.
pub async fn save_log(
    State(state): State<AppState>,
    payload: Result<Json<SaveLogRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = payload?;
    let subject = SubjectName::new(req.subject_name)?;
    let line = req.log_data.replace(['\r', '\n'], " ");

    let path = state.log_layout.append_line(&subject, req.run_id, &line)?;
    Ok(Json(json!({
        "status": "Log saved",
        "path": path.display().to_string(),
    })))
}

pub async fn list_recordings(State(state): State<AppState>) -> Json<Vec<ControllerSnapshot>> {
    Json(state.registry.snapshots())
}

pub async fn get_recording(
    State(state): State<AppState>,
    Path(run_id): Path<i64>,
) -> Result<Json<ControllerSnapshot>, ApiError> {
    state
        .registry
        .get(run_id)
        .map(|controller| Json(controller.snapshot()))
        .ok_or(ApiError::RecordNotFound)
}
