//! Classification results and the bright-region box drawn next to them.
//!
use std::fmt;

use serde::{Deserialize, Serialize};

/// Class vocabulary of the hazard model, in the order of its output vector.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Label {
    Fire,
    Neutral,
    Smoke,
}

impl Label {
    /// All labels, indexed like the model output.
    pub const ALL: [Label; 3] = [Label::Fire, Label::Neutral, Label::Smoke];

    /// Map an output index of the model to its label.
    pub fn from_index(index: usize) -> Option<Label> {
        Self::ALL.get(index).copied()
    }

    /// Whether a detection of this class may trigger an alert.
    pub fn is_hazardous(self) -> bool {
        !matches!(self, Label::Neutral)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Fire => "Fire",
            Label::Neutral => "Neutral",
            Label::Smoke => "Smoke",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top class of one frame with its softmax probability in percent.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Prediction {
    pub label: Label,
    pub confidence: f32,
}

impl Prediction {
    /// Create a prediction, clamping the confidence into `[0, 100]`.
    pub fn new(label: Label, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 100.0)
        };
        Self { label, confidence }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.1}%", self.label, self.confidence)
    }
}

/// Axis-aligned box in pixel coordinates, top-left origin.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}
