//! Alert emails for hazardous detections.
//!
//! An [`AlertDispatcher`] sends an HTML message with the annotated frame attached. Whether a
//! detection may be sent at all is decided by [`should_alert`] and the global [`AlertGate`].
use std::{io::Write, time::Duration};

use chrono::{DateTime, Local};
use common::{prediction::Prediction, settings::EmailSettings};
use futures::future::BoxFuture;
use image::RgbImage;
use lettre::{
    address::AddressError,
    message::{header::ContentType, Attachment, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tokio::time::Instant;

use crate::overlay::encode_jpeg;

/// Port of SMTP with implicit TLS, all others use STARTTLS.
const SMTPS_PORT: u16 = 465;
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);
const ATTACHMENT_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("email transport is not available")]
    Disabled,
    #[error("failed to encode the attachment: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to write the attachment: {0}")]
    Attachment(#[from] std::io::Error),
    #[error("failed to build the message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("failed to send the message: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

pub type AlertResult = Result<(), AlertError>;

/// Receiver of alerts.
pub trait AlertSink: Send + Sync {
    fn send_alert<'a>(
        &'a self,
        subject: &'a str,
        html: &'a str,
        frame: &'a RgbImage,
    ) -> BoxFuture<'a, AlertResult>;
}

type Transport = AsyncSmtpTransport<Tokio1Executor>;

struct Route {
    transport: Transport,
    from: Mailbox,
    to: Mailbox,
}

/// Email alert dispatcher.
///
/// If the transport cannot be set up or does not accept the credentials when connecting, the
/// dispatcher stays disabled and every alert fails right away.
pub struct AlertDispatcher {
    route: Option<Route>,
}

impl AlertDispatcher {
    /// Set up the transport and probe it once.
    pub async fn connect(settings: &EmailSettings) -> Self {
        let route = match build_route(settings) {
            Ok(route) => route,
            Err(err) => {
                log::warn!("Email alerts disabled, invalid configuration: {err}");
                return Self::disabled();
            }
        };

        match route.transport.test_connection().await {
            Ok(true) => {
                log::info!(
                    "Email alerts connected via {}:{}",
                    settings.smtp_server,
                    settings.smtp_port
                );
                Self { route: Some(route) }
            }
            Ok(false) => {
                log::warn!("Email alerts disabled, server did not accept the connection");
                Self::disabled()
            }
            Err(err) => {
                log::warn!("Email alerts disabled, could not connect: {err}");
                Self::disabled()
            }
        }
    }

    /// Dispatcher that never sends.
    pub fn disabled() -> Self {
        Self { route: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.route.is_some()
    }

    async fn try_send(&self, subject: &str, html: &str, frame: &RgbImage) -> AlertResult {
        let route = self.route.as_ref().ok_or(AlertError::Disabled)?;

        // The frame goes through a temporary file, removed when `file` is dropped
        let mut file = tempfile::Builder::new()
            .prefix(&format!("alert_{}_", Local::now().timestamp()))
            .suffix(".jpg")
            .tempfile()?;
        file.write_all(&encode_jpeg(frame, ATTACHMENT_QUALITY)?)?;
        file.flush()?;
        let data = tokio::fs::read(file.path()).await?;

        let filename = file
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "alert.jpg".into());

        let message = Message::builder()
            .from(route.from.clone())
            .to(route.to.clone())
            .subject(subject)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::html(html.to_owned()))
                    .singlepart(Attachment::new(filename).body(data, jpeg_content_type())),
            )?;

        route.transport.send(message).await?;
        Ok(())
    }
}

impl AlertSink for AlertDispatcher {
    fn send_alert<'a>(
        &'a self,
        subject: &'a str,
        html: &'a str,
        frame: &'a RgbImage,
    ) -> BoxFuture<'a, AlertResult> {
        Box::pin(async move {
            let result = self.try_send(subject, html, frame).await;
            match &result {
                Ok(()) => log::info!("Alert email sent: {subject}"),
                Err(AlertError::Disabled) => log::warn!("Email client not available"),
                Err(err) => log::warn!("Alert email failed: {err}"),
            }
            result
        })
    }
}

#[derive(Debug, Error)]
enum RouteError {
    #[error("bad address: {0}")]
    Address(#[from] AddressError),
    #[error("bad relay: {0}")]
    Relay(#[from] lettre::transport::smtp::Error),
}

fn build_route(settings: &EmailSettings) -> Result<Route, RouteError> {
    let from: Mailbox = settings.sender.parse()?;
    let to: Mailbox = settings.receiver.parse()?;

    let builder = if settings.smtp_port == SMTPS_PORT {
        Transport::relay(&settings.smtp_server)?
    } else {
        Transport::starttls_relay(&settings.smtp_server)?
    };
    let transport = builder
        .port(settings.smtp_port)
        .credentials(Credentials::new(
            settings.sender.clone(),
            settings.app_password.clone(),
        ))
        .timeout(Some(SMTP_TIMEOUT))
        .build();

    Ok(Route {
        transport,
        from,
        to,
    })
}

fn jpeg_content_type() -> ContentType {
    ContentType::parse("image/jpeg").unwrap_or(ContentType::TEXT_PLAIN)
}

/// Subject and HTML body of an alert email.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertMessage {
    pub subject: String,
    pub html: String,
}

pub fn compose_alert(prediction: &Prediction, camera: &str, time: DateTime<Local>) -> AlertMessage {
    let subject = format!("ALERT: {} detected in {} camera", prediction.label, camera);
    let html = format!(
        "<div style='font-family: Arial, sans-serif;'>\
         <h3>{label} Detected in {camera} Camera</h3>\
         <p><b>Probability:</b> {confidence:.2}%</p>\
         <p><b>Time:</b> {time}</p>\
         </div>",
        label = prediction.label,
        camera = camera,
        confidence = prediction.confidence,
        time = time.format("%Y-%m-%d %H:%M:%S"),
    );

    AlertMessage { subject, html }
}

/// Whether a prediction qualifies for an alert, ignoring the rate limit.
pub fn should_alert(prediction: &Prediction, threshold: f32) -> bool {
    prediction.label.is_hazardous() && prediction.confidence >= threshold
}

/// Rate limit shared by all cameras.
///
/// Failed attempts close the gate just like successful ones.
#[derive(Debug, Default)]
pub struct AlertGate {
    last_attempt: Option<Instant>,
}

impl AlertGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, now: Instant, interval: Duration) -> bool {
        self.last_attempt
            .map_or(true, |last| now.saturating_duration_since(last) >= interval)
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    /// Time until the gate opens again.
    pub fn remaining(&self, now: Instant, interval: Duration) -> Duration {
        self.last_attempt.map_or(Duration::ZERO, |last| {
            interval.saturating_sub(now.saturating_duration_since(last))
        })
    }
}
