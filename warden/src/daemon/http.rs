//! The HTTP control plane: a thin axum layer over a shared `Manager`
//! handle. Holds no state of its own beyond that handle, per
//! `axum::Router::with_state`.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use warden_core::cmd::Cmd;
use warden_core::error::Error;
use warden_core::manager::Manager;
use warden_core::options::Options;
use warden_core::process_helper::Sig;
use warden_core::service::Service;
use warden_core::snapshot::{ManagerSnapshot, ServiceSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<Manager>,
    /// Base `Options` a `POST /services/add` body is layered on top of,
    /// sourced from the daemon's on-disk settings.
    pub default_options: Options,
}

pub fn router(manager: Arc<Manager>, default_options: Options) -> Router {
    Router::new()
        .route("/manager", get(get_manager))
        .route("/manager/shutdown", post(shutdown_manager))
        .route("/manager/stop_all", post(stop_all))
        .route("/services", get(list_services))
        .route("/services/add", post(add_service))
        .route("/services/{name}", get(get_service).delete(remove_service))
        .route("/services/{name}/start", post(start_service))
        .route("/services/{name}/stop", post(stop_service))
        .route("/services/{name}/scale", post(scale_service))
        .route("/services/{name}/scaleup", post(scale_up))
        .route("/services/{name}/scaledown", post(scale_down))
        .route("/services/{name}/slots/{index}/start", post(start_slot))
        .route("/services/{name}/slots/{index}/stop", post(stop_slot))
        .route("/services/{name}/slots/{index}/sigkill", post(sigkill_slot))
        .with_state(AppState { manager, default_options })
}

/// `warden_core::error::Error` as seen by an HTTP caller: `BadState` → 400,
/// `NotFound` → 404, `Conflict` → 409, anything else → 500.
struct AppError(Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::BadState { .. } => StatusCode::BAD_REQUEST,
            Error::MissingField(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

fn require_service(manager: &Manager, name: &str) -> Result<Arc<Service>, AppError> {
    manager.service(name).ok_or_else(|| AppError(Error::NotFound(name.to_string())))
}

async fn get_manager(State(state): State<AppState>) -> Json<ManagerSnapshot> {
    Json(ManagerSnapshot::of(&state.manager))
}

async fn shutdown_manager(State(state): State<AppState>) -> StatusCode {
    // Runs on the daemon's own clock, not the request's: the response
    // shouldn't block on every service tearing down. Once the manager
    // actually reaches SHUTDOWN we self-SIGTERM so the same signal-driven
    // exit path in `daemon::run` fires regardless of trigger source.
    tokio::spawn(async move {
        match state.manager.shutdown().await {
            Ok(()) => crate::daemon::self_terminate(),
            Err(err) => tracing::warn!(%err, "shutdown request rejected"),
        }
    });
    StatusCode::ACCEPTED
}

async fn stop_all(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.manager.stop_all().await?;
    Ok(StatusCode::OK)
}

async fn list_services(State(state): State<AppState>) -> Json<Vec<ServiceSnapshot>> {
    Json(state.manager.services().iter().map(|s| ServiceSnapshot::of(s)).collect())
}

async fn get_service(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<ServiceSnapshot>, AppError> {
    let service = require_service(&state.manager, &name)?;
    Ok(Json(ServiceSnapshot::of(&service)))
}

fn default_workers() -> usize {
    1
}

#[derive(Deserialize)]
struct AddServiceBody {
    name: Option<String>,
    #[serde(default = "default_workers")]
    workers: usize,
    program: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    /// Whatever the caller overrode; everything else falls back to the
    /// daemon's `default_options`, not `Options::default()`.
    #[serde(flatten)]
    overrides: serde_json::Map<String, serde_json::Value>,
}

/// Layers `overrides` on top of `default_options` and deserializes the
/// result, so a request that only sets e.g. `autorespawn` still inherits
/// every other field from the daemon's configured defaults.
fn resolve_options(
    default_options: &Options,
    overrides: serde_json::Map<String, serde_json::Value>,
) -> Result<Options, Error> {
    let mut merged = serde_json::to_value(default_options)
        .map_err(|err| Error::ConfigDeserialization(err.to_string()))?;
    if let serde_json::Value::Object(base) = &mut merged {
        base.extend(overrides);
    }
    serde_json::from_value(merged).map_err(|err| Error::ConfigDeserialization(err.to_string()))
}

async fn add_service(
    State(state): State<AppState>,
    Json(body): Json<AddServiceBody>,
) -> Result<(StatusCode, Json<ServiceSnapshot>), AppError> {
    let name = body.name.ok_or(Error::MissingField("name"))?;
    let program = body.program.ok_or(Error::MissingField("program"))?;
    if state.manager.service(&name).is_some() {
        return Err(AppError(Error::Conflict(name)));
    }
    let options = resolve_options(&state.default_options, body.overrides)?;
    let cmd = Cmd::new(program, body.args, Arc::new(options));
    let service = Service::new(name, body.workers, cmd);
    state.manager.add_service(service.clone()).await?;
    Ok((StatusCode::CREATED, Json(ServiceSnapshot::of(&service))))
}

async fn remove_service(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    require_service(&state.manager, &name)?;
    state.manager.shutdown_and_remove_service(&name).await?;
    Ok(StatusCode::OK)
}

async fn start_service(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    service.start().await;
    Ok(StatusCode::OK)
}

async fn stop_service(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    service.stop().await;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
struct ScaleBody {
    workers: usize,
}

async fn scale_service(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<ScaleBody>,
) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    service.set_slot_number(body.workers).await;
    Ok(StatusCode::OK)
}

async fn scale_up(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    let target = service.replicas() + 1;
    service.set_slot_number(target).await;
    Ok(StatusCode::OK)
}

async fn scale_down(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    let target = service.replicas().saturating_sub(1).max(1);
    service.set_slot_number(target).await;
    Ok(StatusCode::OK)
}

fn require_slot(
    service: &Service,
    index: usize,
) -> Result<Arc<warden_core::slot::ProcessSlot>, AppError> {
    service.slot(index).ok_or_else(|| AppError(Error::NotFound(format!("slot {index}"))))
}

async fn start_slot(
    State(state): State<AppState>,
    Path((name, index)): Path<(String, usize)>,
) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    let slot = require_slot(&service, index)?;
    slot.start().await;
    Ok(StatusCode::OK)
}

async fn stop_slot(
    State(state): State<AppState>,
    Path((name, index)): Path<(String, usize)>,
) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    let slot = require_slot(&service, index)?;
    slot.stop().await;
    Ok(StatusCode::OK)
}

async fn sigkill_slot(
    State(state): State<AppState>,
    Path((name, index)): Path<(String, usize)>,
) -> Result<StatusCode, AppError> {
    let service = require_service(&state.manager, &name)?;
    let slot = require_slot(&service, index)?;
    slot.kill(Sig::Kill).await;
    Ok(StatusCode::OK)
}
