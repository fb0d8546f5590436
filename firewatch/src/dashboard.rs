//! Operator dashboard served over HTTP.
//!
//! The dashboard is the display side of the polling loop: it receives the camera reports,
//! keeps the latest status per camera and streams annotated frames to browsers. It also carries
//! the operator controls (start/stop, settings, device commands).
use std::{
    collections::BTreeMap,
    convert::Infallible,
    sync::{Arc, Mutex},
};

use axum::{
    body::StreamBody,
    extract::Query,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Local;
use common::{
    prediction::{BoundingBox, Prediction},
    settings::Settings,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    meter::{MeterSnapshot, METER},
    orchestrator::{AlertOutcome, CameraOutcome, CameraReport, ReportSink},
    overlay::encode_jpeg,
    pubsub::NamedPubSub,
    relay::{send_command, RelayReply},
    session::{Session, StreamState},
};

const STREAM_QUALITY: u8 = 85;

/// Shared state of all endpoints.
pub struct DashboardState {
    pub session: Arc<Session>,
    pub board: Arc<StatusBoard>,
    pub pubsub: Arc<NamedPubSub>,
    pub client: reqwest::Client,
}

/// Latest known status of a camera.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CameraStatus {
    Online {
        prediction: Prediction,
        bbox: Option<BoundingBox>,
        alert: String,
        updated: String,
    },
    Offline {
        reason: String,
        updated: String,
    },
    Failed {
        reason: String,
        updated: String,
    },
}

#[derive(Default)]
pub struct StatusBoard {
    cameras: Mutex<BTreeMap<String, CameraStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, report: &CameraReport) {
        let updated = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let status = match &report.outcome {
            CameraOutcome::Offline(err) => CameraStatus::Offline {
                reason: err.to_string(),
                updated,
            },
            CameraOutcome::Failed(err) => CameraStatus::Failed {
                reason: format!("{err:#}"),
                updated,
            },
            CameraOutcome::Detected(detection) => CameraStatus::Online {
                prediction: detection.prediction,
                bbox: detection.bbox,
                alert: detection.alert.to_string(),
                updated,
            },
        };

        self.lock().insert(report.camera.clone(), status);
    }

    pub fn snapshot(&self) -> BTreeMap<String, CameraStatus> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, CameraStatus>> {
        self.cameras
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Report sink feeding the status board and the camera streams.
pub struct DashboardSink {
    board: Arc<StatusBoard>,
    pubsub: Arc<NamedPubSub>,
}

impl DashboardSink {
    pub fn new(board: Arc<StatusBoard>, pubsub: Arc<NamedPubSub>) -> Self {
        Self { board, pubsub }
    }
}

impl ReportSink for DashboardSink {
    fn publish(&mut self, report: CameraReport) {
        self.board.record(&report);

        let CameraOutcome::Detected(detection) = &report.outcome else {
            return;
        };
        // Skip encoding when nobody watches
        if !self.pubsub.has_receivers(&report.camera) {
            return;
        }
        match encode_jpeg(&detection.frame, STREAM_QUALITY) {
            Ok(jpeg) => {
                self.pubsub
                    .get_broadcast_sender(&report.camera)
                    .send(as_jpeg_stream_item(&jpeg))
                    .ok();
            }
            Err(err) => log::warn!("Failed to encode frame of {}: {}", report.camera, err),
        }
    }
}

/// Wrap a JPEG as one part of a `multipart/x-mixed-replace` stream.
pub fn as_jpeg_stream_item(data: &[u8]) -> Vec<u8> {
    [
        "--frame\r\nContent-Type: image/jpeg\r\n\r\n".as_bytes(),
        data,
        "\r\n\r\n".as_bytes(),
    ]
    .concat()
}

pub fn router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/healthcheck", get(healthcheck))
        .route("/status", get(status))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/settings", get(get_settings).post(save_settings))
        .route("/stream", get(camera_stream))
        .route("/motorcmd", get(motor_command))
        .layer(Extension(state))
}

/// Health check endpoint.
pub async fn healthcheck() -> &'static str {
    "healthy"
}

#[derive(Debug, Serialize)]
pub struct StatusReply {
    pub state: StreamState,
    pub cameras: BTreeMap<String, CameraStatus>,
    pub meter: MeterSnapshot,
}

pub async fn status(Extension(state): Extension<Arc<DashboardState>>) -> Json<StatusReply> {
    Json(StatusReply {
        state: state.session.state(),
        cameras: state.board.snapshot(),
        meter: METER.snapshot(),
    })
}

pub async fn start(Extension(state): Extension<Arc<DashboardState>>) -> Json<StreamState> {
    state.session.start();
    Json(state.session.state())
}

pub async fn stop(Extension(state): Extension<Arc<DashboardState>>) -> Json<StreamState> {
    state.session.stop();
    Json(state.session.state())
}

pub async fn get_settings(Extension(state): Extension<Arc<DashboardState>>) -> Json<Settings> {
    Json(state.session.settings().redacted())
}

/// Commit edited settings; all or nothing.
pub async fn save_settings(
    Extension(state): Extension<Arc<DashboardState>>,
    Json(settings): Json<Settings>,
) -> Result<Json<Settings>, (StatusCode, String)> {
    match state.session.save_settings(settings).await {
        Ok(()) => Ok(Json(state.session.settings().redacted())),
        Err(err) => {
            log::warn!("Settings rejected: {err:#}");
            Err((StatusCode::BAD_REQUEST, format!("{err:#}")))
        }
    }
}

/// Search parameters available to streams.
#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    name: Option<String>,
}

/// Annotated frames of one camera as MJPEG. Only configured cameras have a stream.
pub async fn camera_stream(
    Extension(state): Extension<Arc<DashboardState>>,
    Query(params): Query<StreamParams>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let name = params.name.unwrap_or_default();
    let configured = state
        .session
        .active()
        .settings
        .cameras
        .iter()
        .any(|camera| camera.name == name);
    if !configured {
        return Err((StatusCode::NOT_FOUND, format!("no camera named {name:?}")));
    }
    log::info!("Stream for {} requested", &name);

    // Lagging behind only drops frames
    let rx = state.pubsub.get_broadcast_receiver(&name);
    let stream = BroadcastStream::new(rx)
        .filter_map(|item| async move { item.ok().map(Ok::<_, Infallible>) });

    // Set body and headers for multipart streaming
    let body = StreamBody::new(stream);
    let headers = [(
        header::CONTENT_TYPE,
        "multipart/x-mixed-replace; boundary=frame",
    )];

    Ok((headers, body))
}

#[derive(Debug, Deserialize)]
pub struct CommandParams {
    cmd: String,
}

/// Relay a command to the device and hand back its answer.
pub async fn motor_command(
    Extension(state): Extension<Arc<DashboardState>>,
    Query(params): Query<CommandParams>,
) -> Result<Json<RelayReply>, (StatusCode, String)> {
    let settings = state.session.settings();
    let Some(base_url) = settings.device_url.as_deref() else {
        return Err((StatusCode::BAD_REQUEST, "no device URL configured".into()));
    };

    send_command(&state.client, base_url, &params.cmd, settings.fetch_timeout())
        .await
        .map(Json)
        .map_err(|err| {
            log::warn!("Device command failed: {err:#}");
            (StatusCode::BAD_GATEWAY, format!("{err:#}"))
        })
}
