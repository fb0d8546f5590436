//! Hazard classification with a pretrained ONNX model.
//!
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use common::prediction::{Label, Prediction};
use image::RgbImage;
use tract_onnx::prelude::*;

type NnModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Side length of the square model input.
pub const INPUT_SIZE: u32 = 224;

/// ImageNet statistics the model was trained with, RGB order.
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Anything that maps a frame to a prediction.
pub trait Classify: Send + Sync {
    fn predict(&self, frame: &RgbImage) -> Result<Prediction>;
}

/// Fire/neutral/smoke classifier.
pub struct HazardClassifier {
    model: NnModel,
    path: PathBuf,
}

impl HazardClassifier {
    /// Load and optimize the model. Without a model nothing can be classified, so callers
    /// treat an error here as fatal.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input_fact = InferenceFact::dt_shape(
            f32::datum_type(),
            tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
        );
        let model = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| model.with_input_fact(0, input_fact))
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .with_context(|| format!("failed to load model {}", path.display()))?;

        log::info!("Loaded model {}", path.display());
        Ok(Self {
            model,
            path: path.to_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Classify for HazardClassifier {
    fn predict(&self, frame: &RgbImage) -> Result<Prediction> {
        let input = tvec!(preproc(frame).into());
        let raw_nn_out = self.model.run(input)?;

        let scores: Vec<f32> = raw_nn_out[0].to_array_view::<f32>()?.iter().copied().collect();
        postproc(&scores)
    }
}

/// Resize to the model input and normalize into an NCHW tensor with batch size one.
pub fn preproc(frame: &RgbImage) -> Tensor {
    let resized: RgbImage = image::imageops::resize(
        frame,
        INPUT_SIZE,
        INPUT_SIZE,
        image::imageops::FilterType::Triangle,
    );

    tract_ndarray::Array4::from_shape_fn(
        (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
        |(_, c, y, x)| (resized[(x as _, y as _)][c] as f32 / 255.0 - MEAN[c]) / STD[c],
    )
    .into()
}

/// Read out the most likely class from the raw class scores.
pub fn postproc(scores: &[f32]) -> Result<Prediction> {
    if scores.len() != Label::ALL.len() {
        bail!(
            "model produced {} scores, expected {}",
            scores.len(),
            Label::ALL.len()
        );
    }

    let probabilities = softmax(scores);
    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (index, p)| {
            if p > best.1 {
                (index, p)
            } else {
                best
            }
        });

    let label = Label::from_index(index).context("class index out of range")?;
    Ok(Prediction::new(label, probability * 100.0))
}

/// Numerically stable softmax.
fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    exps.iter().map(|e| e / sum).collect()
}
