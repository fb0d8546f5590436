//! Operator session: streaming state and the active configuration.
//!
//! The session owns everything the polling loop needs besides the cameras themselves: the
//! settings, the loaded model and the alert transport. Operators replace them as a whole with
//! [`Session::save_settings`], the loop picks up the new configuration at its next tick.
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use common::settings::{EmailSettings, Settings, REDACTED};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::{
    alert::{AlertDispatcher, AlertSink},
    nn::{Classify, HazardClassifier},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// Configuration in effect for a tick.
pub struct ActiveConfig {
    pub settings: Settings,
    pub classifier: Arc<dyn Classify>,
    /// Present when email alerts are enabled.
    pub alerts: Option<Arc<dyn AlertSink>>,
}

/// Creates the model handle and alert transport for a configuration.
pub trait Provider: Send + Sync {
    fn load_classifier(&self, path: &Path) -> Result<Arc<dyn Classify>>;

    fn connect_alerts<'a>(&'a self, email: &'a EmailSettings) -> BoxFuture<'a, Arc<dyn AlertSink>>;
}

/// ONNX classifier and SMTP alerts.
#[derive(Debug, Default)]
pub struct DefaultProvider;

impl Provider for DefaultProvider {
    fn load_classifier(&self, path: &Path) -> Result<Arc<dyn Classify>> {
        Ok(Arc::new(HazardClassifier::load(path)?))
    }

    fn connect_alerts<'a>(&'a self, email: &'a EmailSettings) -> BoxFuture<'a, Arc<dyn AlertSink>> {
        Box::pin(async move {
            let dispatcher: Arc<dyn AlertSink> = Arc::new(AlertDispatcher::connect(email).await);
            dispatcher
        })
    }
}

pub struct Session {
    state: watch::Sender<StreamState>,
    active: watch::Sender<Arc<ActiveConfig>>,
    provider: Box<dyn Provider>,
    /// Saved settings are also written here.
    settings_path: Option<PathBuf>,
    save_lock: Mutex<()>,
}

impl Session {
    /// Build the initial configuration. Fails if the settings are invalid or the model cannot be
    /// loaded.
    pub async fn new(
        settings: Settings,
        provider: Box<dyn Provider>,
        settings_path: Option<PathBuf>,
    ) -> Result<Self> {
        settings.validate()?;

        let classifier = provider.load_classifier(&settings.model_path)?;
        let alerts = match settings.email.enabled {
            true => Some(provider.connect_alerts(&settings.email).await),
            false => None,
        };

        let (state, _) = watch::channel(StreamState::Idle);
        let (active, _) = watch::channel(Arc::new(ActiveConfig {
            settings,
            classifier,
            alerts,
        }));

        Ok(Self {
            state,
            active,
            provider,
            settings_path,
            save_lock: Mutex::new(()),
        })
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StreamState> {
        self.state.subscribe()
    }

    /// Begin polling the cameras.
    pub fn start(&self) {
        if self.set_state(StreamState::Streaming) {
            log::info!("Streaming all cameras");
        }
    }

    /// Stop polling. Takes effect before the next tick; a running tick finishes.
    pub fn stop(&self) {
        if self.set_state(StreamState::Idle) {
            log::info!("Stream stop requested");
        }
    }

    fn set_state(&self, new_state: StreamState) -> bool {
        self.state.send_if_modified(|state| {
            let modified = *state != new_state;
            *state = new_state;
            modified
        })
    }

    /// Snapshot of the configuration in effect.
    pub fn active(&self) -> Arc<ActiveConfig> {
        self.active.borrow().clone()
    }

    pub fn settings(&self) -> Settings {
        self.active().settings.clone()
    }

    /// Commit a complete set of edited settings.
    ///
    /// Either all of them become active or, on error, none. The model is only reloaded when its
    /// path changed; an app password equal to the redaction placeholder keeps the current one.
    pub async fn save_settings(&self, mut settings: Settings) -> Result<()> {
        let _guard = self.save_lock.lock().await;
        let current = self.active();

        if settings.email.app_password == REDACTED {
            settings.email.app_password = current.settings.email.app_password.clone();
        }
        settings.validate()?;

        let classifier = if settings.model_path == current.settings.model_path {
            current.classifier.clone()
        } else {
            self.provider
                .load_classifier(&settings.model_path)
                .context("model path rejected")?
        };

        let alerts = match (&current.alerts, settings.email.enabled) {
            (_, false) => None,
            (Some(alerts), true) if current.settings.email == settings.email => {
                Some(alerts.clone())
            }
            (_, true) => Some(self.provider.connect_alerts(&settings.email).await),
        };

        if let Some(path) = &self.settings_path {
            settings.save(path)?;
        }

        self.active.send_replace(Arc::new(ActiveConfig {
            settings,
            classifier,
            alerts,
        }));
        log::info!("Settings saved");

        Ok(())
    }
}
