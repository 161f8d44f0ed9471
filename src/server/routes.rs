use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::ws::split_socket;
use super::AppState;
use crate::config::Resolution;
use crate::error::StreamError;
use crate::registry::{StartOutcome, StreamStatus};

/// A [`StreamError`] rendered as `{"detail": ...}` with a mapped status code.
#[derive(Debug)]
pub struct ApiError(pub StreamError);

impl From<StreamError> for ApiError {
    fn from(err: StreamError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            StreamError::NotFound(_) => StatusCode::NOT_FOUND,
            StreamError::Disabled(_) => StatusCode::BAD_REQUEST,
            StreamError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct CameraStatus {
    pub websocket: bool,
    pub hls: bool,
    pub hls_running: bool,
}

#[derive(Debug, Serialize)]
pub struct CameraSummary {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub enabled: bool,
    pub resolution: Resolution,
    pub status: CameraStatus,
}

#[derive(Debug, Serialize)]
pub struct CamerasResponse {
    pub cameras: Vec<CameraSummary>,
}

pub(super) async fn list_cameras(State(state): State<Arc<AppState>>) -> Json<CamerasResponse> {
    let mut cameras = Vec::with_capacity(state.catalog.len());
    for camera in state.catalog.iter() {
        let hls = state.segmented.status(&camera.id).await;
        cameras.push(CameraSummary {
            id: camera.id.clone(),
            name: camera.name.clone(),
            location: camera.location.clone(),
            enabled: camera.enabled,
            resolution: camera.resolution,
            status: CameraStatus {
                websocket: state.relay.active_sessions(&camera.id) > 0,
                hls: hls.output_ready,
                hls_running: hls.running,
            },
        });
    }
    Json(CamerasResponse { cameras })
}

pub(super) async fn start_hls(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.segmented.start(&camera_id).await?;
    let status = match outcome {
        StartOutcome::Started => "started",
        StartOutcome::AlreadyRunning => "already running",
    };
    Ok(Json(json!({
        "status": status,
        "hls_url": state.segmented.layout().playlist_url(&camera_id),
    })))
}

pub(super) async fn stop_hls(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<String>,
) -> Json<serde_json::Value> {
    state.segmented.stop(&camera_id).await;
    Json(json!({ "status": "stopped" }))
}

pub(super) async fn hls_status(
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<String>,
) -> Json<StreamStatus> {
    Json(state.segmented.status(&camera_id).await)
}

pub(super) async fn relay_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(camera_id): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        let (sink, events) = split_socket(socket);
        let outcome = state
            .relay
            .serve(&camera_id, state.catalog.get(&camera_id), sink, events)
            .await;
        debug!(stream_id = %camera_id, "Relay session finished: {:?}", outcome);
    })
}
