//! The polling loop.
//!
//! While the session is streaming, every tick visits the configured cameras one after the other:
//! fetch a frame, classify it, box the brightest region, annotate the frame and maybe send an
//! alert. The result for each camera goes to a [`ReportSink`]. A camera that fails only skips
//! its own turn; the loop itself ends only with the task running it.
use std::{any::Any, fmt, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use common::{
    prediction::{BoundingBox, Prediction},
    settings::CameraSettings,
};
use futures::FutureExt;
use image::RgbImage;
use tokio::{sync::mpsc::UnboundedSender, time::Instant};

use crate::{
    alert::{compose_alert, should_alert, AlertError, AlertGate},
    fetcher::{FetchError, FrameSource},
    localizer::locate,
    meter::METER,
    overlay::{label_color, render},
    session::{ActiveConfig, Session, StreamState},
};

/// Result of one camera in one tick.
#[derive(Debug)]
pub struct CameraReport {
    pub camera: String,
    pub outcome: CameraOutcome,
}

#[derive(Debug)]
pub enum CameraOutcome {
    /// No usable frame.
    Offline(FetchError),
    /// Frame received but processing failed.
    Failed(anyhow::Error),
    Detected(Detection),
}

#[derive(Debug)]
pub struct Detection {
    pub prediction: Prediction,
    pub bbox: Option<BoundingBox>,
    /// Annotated frame.
    pub frame: RgbImage,
    pub alert: AlertOutcome,
}

#[derive(Debug)]
pub enum AlertOutcome {
    /// Alerts disabled or the prediction does not qualify.
    Skipped,
    /// Qualifies, but an alert went out too recently.
    RateLimited { remaining: Duration },
    Sent,
    Failed(AlertError),
}

impl fmt::Display for AlertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertOutcome::Skipped => f.write_str("none"),
            AlertOutcome::RateLimited { remaining } => {
                write!(f, "rate limited, {}s left", remaining.as_secs())
            }
            AlertOutcome::Sent => f.write_str("sent"),
            AlertOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Consumer of camera reports, usually the operator's display.
pub trait ReportSink: Send {
    fn publish(&mut self, report: CameraReport);
}

impl ReportSink for Vec<CameraReport> {
    fn publish(&mut self, report: CameraReport) {
        self.push(report);
    }
}

impl ReportSink for UnboundedSender<CameraReport> {
    fn publish(&mut self, report: CameraReport) {
        // Nobody listening is fine
        self.send(report).ok();
    }
}

pub struct Orchestrator<R> {
    session: Arc<Session>,
    source: Arc<dyn FrameSource>,
    sink: R,
    /// One gate for all cameras, kept across stop and start.
    gate: AlertGate,
}

impl<R: ReportSink> Orchestrator<R> {
    pub fn new(session: Arc<Session>, source: Arc<dyn FrameSource>, sink: R) -> Self {
        Self {
            session,
            source,
            sink,
            gate: AlertGate::new(),
        }
    }

    pub fn sink(&self) -> &R {
        &self.sink
    }

    /// Poll while the session is streaming, wait while it is idle.
    pub async fn run(&mut self) {
        let mut state_rx = self.session.subscribe_state();
        let mut streaming = false;

        loop {
            if *state_rx.borrow_and_update() == StreamState::Idle {
                if streaming {
                    log::info!("Stream stopped");
                    streaming = false;
                }
                if state_rx.changed().await.is_err() {
                    return;
                }
                continue;
            }
            streaming = true;

            // The configuration stays fixed for a whole tick
            let config = self.session.active();
            self.tick(&config).await;

            tokio::time::sleep(config.settings.frame_delay()).await;
        }
    }

    /// Visit every camera once.
    pub async fn tick(&mut self, config: &ActiveConfig) {
        for camera in config.settings.cameras.iter() {
            let outcome = match AssertUnwindSafe(self.visit(config, camera))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    METER.tick_failed();
                    let err = anyhow!("processing panicked: {}", panic_message(&*panic));
                    log::error!("{} camera skipped: {:#}", camera.name, err);
                    CameraOutcome::Failed(err)
                }
            };

            self.sink.publish(CameraReport {
                camera: camera.name.clone(),
                outcome,
            });
        }
    }

    async fn visit(&mut self, config: &ActiveConfig, camera: &CameraSettings) -> CameraOutcome {
        match self
            .source
            .fetch(&camera.url, config.settings.fetch_timeout())
            .await
        {
            Err(err) => {
                METER.tick_offline();
                log::warn!("{} camera offline: {}", camera.name, err);
                CameraOutcome::Offline(err)
            }
            Ok(frame) => {
                METER.tick_fetched();
                match self.process(config, &camera.name, frame).await {
                    Ok(detection) => CameraOutcome::Detected(detection),
                    Err(err) => {
                        METER.tick_failed();
                        log::error!("{} camera skipped: {:#}", camera.name, err);
                        CameraOutcome::Failed(err)
                    }
                }
            }
        }
    }

    async fn process(
        &mut self,
        config: &ActiveConfig,
        camera: &str,
        frame: RgbImage,
    ) -> Result<Detection> {
        let prediction = config
            .classifier
            .predict(&frame)
            .context("classification failed")?;
        let bbox = locate(&frame);
        log::debug!("{camera}: {prediction}, bright region {bbox:?}");

        let frame = render(frame, bbox, &prediction, label_color(prediction.label));
        let alert = self
            .evaluate_alert(config, camera, &prediction, &frame)
            .await;

        Ok(Detection {
            prediction,
            bbox,
            frame,
            alert,
        })
    }

    async fn evaluate_alert(
        &mut self,
        config: &ActiveConfig,
        camera: &str,
        prediction: &Prediction,
        frame: &RgbImage,
    ) -> AlertOutcome {
        let alerts = match &config.alerts {
            Some(alerts) if should_alert(prediction, config.settings.confidence_threshold) => {
                alerts
            }
            _ => return AlertOutcome::Skipped,
        };

        let interval = config.settings.email.interval();
        let now = Instant::now();
        if !self.gate.is_open(now, interval) {
            return AlertOutcome::RateLimited {
                remaining: self.gate.remaining(now, interval),
            };
        }

        let message = compose_alert(prediction, camera, Local::now());
        let result = alerts
            .send_alert(&message.subject, &message.html, frame)
            .await;
        // Failed attempts also wait a full interval
        self.gate.mark(Instant::now());
        METER.tick_alert(result.is_ok());

        match result {
            Ok(()) => AlertOutcome::Sent,
            Err(err) => AlertOutcome::Failed(err),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown cause"
    }
}
