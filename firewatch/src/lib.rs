//! Hazard watch over networked still cameras.
//!
//! Frames are polled from the configured cameras, classified into fire, smoke or neutral scenes,
//! annotated and, when a hazard is detected with enough confidence, reported by email.
pub mod alert;
pub mod dashboard;
pub mod fetcher;
pub mod localizer;
pub mod meter;
pub mod nn;
pub mod orchestrator;
pub mod overlay;
pub mod pubsub;
pub mod relay;
pub mod session;

pub use common::{prediction, settings};
