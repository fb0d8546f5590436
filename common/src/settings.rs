//! Operator settings.
//!
//! Settings are edited as a whole and committed in one step. They can be kept in a JSON file
//! between runs; every field is optional there and falls back to its default.
use std::{
    collections::HashSet,
    fmt,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lowest accepted alert threshold in percent.
pub const MIN_CONFIDENCE_THRESHOLD: f32 = 50.0;
/// Highest accepted alert threshold in percent.
pub const MAX_CONFIDENCE_THRESHOLD: f32 = 100.0;
/// Shortest accepted interval between two alert emails.
pub const MIN_EMAIL_INTERVAL_SECS: u64 = 10;
/// Shortest accepted delay between two ticks.
pub const MIN_FRAME_DELAY_SECS: f64 = 0.05;
/// Placeholder shown instead of the app password.
pub const REDACTED: &str = "********";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("at least one camera must be configured")]
    NoCameras,
    #[error("camera name must not be empty")]
    EmptyCameraName,
    #[error("camera name {0:?} is used twice")]
    DuplicateCameraName(String),
    #[error("camera {0:?} has no URL")]
    EmptyCameraUrl(String),
    #[error("model path must not be empty")]
    EmptyModelPath,
    #[error("confidence threshold {0} is outside of [50, 100]")]
    ConfidenceThreshold(f32),
    #[error("email interval of {0}s is below the minimum of 10s")]
    EmailInterval(u64),
    #[error("email alerts are enabled but {0} is missing")]
    MissingEmailField(&'static str),
    #[error("frame delay of {0}s is below the minimum of 0.05s")]
    FrameDelay(f64),
    #[error("fetch timeout must be positive, got {0}s")]
    FetchTimeout(f64),
    #[error("failed to access settings file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed settings file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One polled camera.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CameraSettings {
    pub name: String,
    pub url: String,
}

impl CameraSettings {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Alert email configuration.
#[derive(Clone, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub sender: String,
    pub app_password: String,
    pub receiver: String,
    pub interval_secs: u64,
    pub smtp_server: String,
    pub smtp_port: u16,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sender: String::new(),
            app_password: String::new(),
            receiver: String::new(),
            interval_secs: 60,
            smtp_server: "smtp.gmail.com".into(),
            smtp_port: 465,
        }
    }
}

impl EmailSettings {
    /// Minimum time between two alert attempts.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Copy with the app password blanked out, for display.
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        if !redacted.app_password.is_empty() {
            redacted.app_password = REDACTED.into();
        }
        redacted
    }
}

impl fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailSettings")
            .field("enabled", &self.enabled)
            .field("sender", &self.sender)
            .field("app_password", &"<redacted>")
            .field("receiver", &self.receiver)
            .field("interval_secs", &self.interval_secs)
            .field("smtp_server", &self.smtp_server)
            .field("smtp_port", &self.smtp_port)
            .finish()
    }
}

/// Complete configuration of a watch session.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Settings {
    pub cameras: Vec<CameraSettings>,
    pub model_path: PathBuf,
    /// Minimum confidence in percent for an alert.
    pub confidence_threshold: f32,
    pub email: EmailSettings,
    /// Sleep between two ticks.
    pub frame_delay_secs: f64,
    pub fetch_timeout_secs: f64,
    /// Base URL of the device taking motor commands.
    pub device_url: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cameras: vec![
                CameraSettings::new("Front", "http://192.168.0.50/front/cam-mid.jpg"),
                CameraSettings::new("Back", "http://192.168.0.51/back/cam-mid.jpg"),
                CameraSettings::new("Right", "http://192.168.0.52/right/cam-mid.jpg"),
                CameraSettings::new("Left", "http://192.168.0.53/left/cam-mid.jpg"),
            ],
            model_path: PathBuf::from("Model/trained_model.onnx"),
            confidence_threshold: 85.0,
            email: EmailSettings::default(),
            frame_delay_secs: 0.2,
            fetch_timeout_secs: 5.0,
            device_url: None,
        }
    }
}

impl Settings {
    /// Check all values against their accepted ranges.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cameras.is_empty() {
            return Err(SettingsError::NoCameras);
        }

        let mut names = HashSet::new();
        for camera in self.cameras.iter() {
            if camera.name.trim().is_empty() {
                return Err(SettingsError::EmptyCameraName);
            }
            if !names.insert(camera.name.as_str()) {
                return Err(SettingsError::DuplicateCameraName(camera.name.clone()));
            }
            if camera.url.trim().is_empty() {
                return Err(SettingsError::EmptyCameraUrl(camera.name.clone()));
            }
        }

        if self.model_path.as_os_str().is_empty() {
            return Err(SettingsError::EmptyModelPath);
        }

        // Written to also reject NaN
        if !(MIN_CONFIDENCE_THRESHOLD..=MAX_CONFIDENCE_THRESHOLD).contains(&self.confidence_threshold)
        {
            return Err(SettingsError::ConfidenceThreshold(self.confidence_threshold));
        }

        if self.email.interval_secs < MIN_EMAIL_INTERVAL_SECS {
            return Err(SettingsError::EmailInterval(self.email.interval_secs));
        }

        if self.email.enabled {
            let required = [
                ("sender", &self.email.sender),
                ("app_password", &self.email.app_password),
                ("receiver", &self.email.receiver),
                ("smtp_server", &self.email.smtp_server),
            ];
            for (field, value) in required {
                if value.trim().is_empty() {
                    return Err(SettingsError::MissingEmailField(field));
                }
            }
        }

        if !(self.frame_delay_secs >= MIN_FRAME_DELAY_SECS) || !self.frame_delay_secs.is_finite() {
            return Err(SettingsError::FrameDelay(self.frame_delay_secs));
        }

        if !(self.fetch_timeout_secs > 0.0) || !self.fetch_timeout_secs.is_finite() {
            return Err(SettingsError::FetchTimeout(self.fetch_timeout_secs));
        }

        Ok(())
    }

    pub fn frame_delay(&self) -> Duration {
        Duration::from_secs_f64(self.frame_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.fetch_timeout_secs)
    }

    /// Copy that is safe to show to the operator.
    pub fn redacted(&self) -> Self {
        Self {
            email: self.email.redacted(),
            ..self.clone()
        }
    }

    /// Read and validate settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_owned(),
            source,
        })?;
        let settings: Settings =
            serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_owned(),
                source,
            })?;
        settings.validate()?;

        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write the settings as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        let content =
            serde_json::to_string_pretty(self).map_err(|source| SettingsError::Parse {
                path: path.to_owned(),
                source,
            })?;
        fs::write(path, content).map_err(|source| SettingsError::Io {
            path: path.to_owned(),
            source,
        })?;

        log::debug!("Settings written to {}", path.display());
        Ok(())
    }
}
