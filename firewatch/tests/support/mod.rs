//! Stand-ins for the cameras, the model and the mail server.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use axum::Router;
use firewatch::{
    alert::{AlertError, AlertResult, AlertSink},
    fetcher::{FetchError, FetchResult, FrameSource},
    nn::Classify,
    prediction::{Label, Prediction},
    session::{Provider, Session},
    settings::{CameraSettings, EmailSettings, Settings},
};
use futures::future::BoxFuture;
use image::{Rgb, RgbImage};
use reqwest::StatusCode;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Dark frame with one bright square.
pub fn test_frame() -> RgbImage {
    let mut frame = RgbImage::from_pixel(160, 120, Rgb([20, 20, 20]));
    for y in 40..60 {
        for x in 50..80 {
            frame.put_pixel(x, y, Rgb([250, 250, 250]));
        }
    }
    frame
}

pub fn camera_url(name: &str) -> String {
    format!("http://cams.test/{}.jpg", name.to_lowercase())
}

/// Settings for the given cameras with alerts enabled every 60s.
pub fn settings_for(cameras: &[&str]) -> Settings {
    Settings {
        cameras: cameras
            .iter()
            .map(|name| CameraSettings::new(*name, camera_url(name)))
            .collect(),
        model_path: "models/hazard.onnx".into(),
        email: EmailSettings {
            enabled: true,
            sender: "watch@example.com".into(),
            app_password: "secret".into(),
            receiver: "ops@example.com".into(),
            interval_secs: 60,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Frame source answering from a fixed table; unknown URLs are offline.
#[derive(Default)]
pub struct FakeCameras {
    frames: HashMap<String, RgbImage>,
    fetches: AtomicUsize,
}

impl FakeCameras {
    pub fn with_frame(mut self, name: &str, frame: RgbImage) -> Self {
        self.frames.insert(camera_url(name), frame);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl FrameSource for FakeCameras {
    fn fetch<'a>(&'a self, url: &'a str, _timeout: Duration) -> BoxFuture<'a, FetchResult> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let result = self
            .frames
            .get(url)
            .cloned()
            .ok_or(FetchError::Status(StatusCode::SERVICE_UNAVAILABLE));
        Box::pin(async move { result })
    }
}

/// Classifier with a settable answer.
pub struct FakeClassifier {
    answer: Mutex<Option<Prediction>>,
    panics: AtomicBool,
}

impl FakeClassifier {
    pub fn new(prediction: Prediction) -> Self {
        Self {
            answer: Mutex::new(Some(prediction)),
            panics: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: Mutex::new(None),
            panics: AtomicBool::new(false),
        }
    }

    pub fn answer(&self, prediction: Option<Prediction>) {
        *self.answer.lock().unwrap() = prediction;
    }

    /// Make every prediction panic until switched off again.
    pub fn panic(&self, panics: bool) {
        self.panics.store(panics, Ordering::SeqCst);
    }
}

impl Classify for FakeClassifier {
    fn predict(&self, _frame: &RgbImage) -> Result<Prediction> {
        if self.panics.load(Ordering::SeqCst) {
            panic!("tensor shape mismatch");
        }
        match *self.answer.lock().unwrap() {
            Some(prediction) => Ok(prediction),
            None => bail!("inference blew up"),
        }
    }
}

/// Alert sink remembering every subject it was asked to send.
#[derive(Default)]
pub struct RecordingAlerts {
    subjects: Mutex<Vec<String>>,
    failing: bool,
}

impl RecordingAlerts {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn subjects(&self) -> Vec<String> {
        self.subjects.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn send_alert<'a>(
        &'a self,
        subject: &'a str,
        _html: &'a str,
        _frame: &'a RgbImage,
    ) -> BoxFuture<'a, AlertResult> {
        self.subjects.lock().unwrap().push(subject.to_owned());
        let result = match self.failing {
            true => Err(AlertError::Disabled),
            false => Ok(()),
        };
        Box::pin(async move { result })
    }
}

/// Provider handing out the fakes. Model paths containing "missing" fail to load.
pub struct FakeProvider {
    pub classifier: Arc<FakeClassifier>,
    pub alerts: Arc<RecordingAlerts>,
    pub loads: Arc<AtomicUsize>,
    pub connects: Arc<AtomicUsize>,
}

impl FakeProvider {
    pub fn new(classifier: Arc<FakeClassifier>, alerts: Arc<RecordingAlerts>) -> Self {
        Self {
            classifier,
            alerts,
            loads: Arc::default(),
            connects: Arc::default(),
        }
    }
}

impl Provider for FakeProvider {
    fn load_classifier(&self, path: &Path) -> Result<Arc<dyn Classify>> {
        if path.to_string_lossy().contains("missing") {
            bail!("no model at {}", path.display());
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.classifier.clone())
    }

    fn connect_alerts<'a>(&'a self, _email: &'a EmailSettings) -> BoxFuture<'a, Arc<dyn AlertSink>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let alerts: Arc<dyn AlertSink> = self.alerts.clone();
        Box::pin(async move { alerts })
    }
}

/// Everything a test needs around a session.
pub struct Rig {
    pub session: Arc<Session>,
    pub classifier: Arc<FakeClassifier>,
    pub alerts: Arc<RecordingAlerts>,
    pub loads: Arc<AtomicUsize>,
    pub connects: Arc<AtomicUsize>,
}

impl Rig {
    pub async fn new(settings: Settings, prediction: Prediction) -> Rig {
        Self::with_alerts(settings, prediction, RecordingAlerts::default()).await
    }

    pub async fn with_alerts(
        settings: Settings,
        prediction: Prediction,
        alerts: RecordingAlerts,
    ) -> Rig {
        let provider = FakeProvider::new(Arc::new(FakeClassifier::new(prediction)), Arc::new(alerts));
        let classifier = provider.classifier.clone();
        let alerts = provider.alerts.clone();
        let loads = provider.loads.clone();
        let connects = provider.connects.clone();

        let session = Session::new(settings, Box::new(provider), None)
            .await
            .expect("session with fake provider");

        Rig {
            session: Arc::new(session),
            classifier,
            alerts,
            loads,
            connects,
        }
    }
}

pub fn fire(confidence: f32) -> Prediction {
    Prediction::new(Label::Fire, confidence)
}

/// Serve `app` on a free local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);

    addr
}

/// A local port nobody listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
