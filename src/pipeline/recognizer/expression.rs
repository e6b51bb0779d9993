use std::path::Path;

use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{ExpressionEngine, common};
use crate::{
    emotion::{Emotion, EmotionScores},
    types::Frame,
};

/// FER+ takes a 64x64 single-channel face.
pub const FERPLUS_INPUT_SIZE: u32 = 64;

/// Fraction of the frame's short side taken around the center as the face.
const FACE_CROP_FRACTION: f32 = 0.6;

/// FER+ output order. The model's eighth class, contempt, has no brush color.
const FERPLUS_CLASSES: [Option<Emotion>; 8] = [
    Some(Emotion::Neutral),
    Some(Emotion::Happy),
    Some(Emotion::Surprised),
    Some(Emotion::Sad),
    Some(Emotion::Angry),
    Some(Emotion::Disgusted),
    Some(Emotion::Fearful),
    None,
];

/// Grayscale `[1, 1, 64, 64]` tensor with raw 0..255 intensities from a
/// square around the middle of the frame.
pub fn prepare_face(frame: &Frame) -> Result<Array4<f32>> {
    common::check_frame(frame)?;
    let side = (frame.width.min(frame.height) as f32 * FACE_CROP_FRACTION).max(1.0);
    let left = (frame.width as f32 - side) / 2.0;
    let top = (frame.height as f32 - side) / 2.0;

    let src = fir::images::ImageRef::new(
        frame.width,
        frame.height,
        &frame.rgba,
        fir::PixelType::U8x4,
    )?;
    let mut dst = fir::images::Image::new(FERPLUS_INPUT_SIZE, FERPLUS_INPUT_SIZE, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .crop(left as f64, top as f64, side as f64, side as f64)
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("face resize failed")?;

    let gray: Vec<f32> = dst
        .buffer()
        .chunks_exact(4)
        .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
        .collect();
    let size = FERPLUS_INPUT_SIZE as usize;
    Array4::from_shape_vec((1, 1, size, size), gray)
        .map_err(|err| anyhow!("failed to build face tensor: {err}"))
}

/// Softmax over all eight FER+ logits, keeping the seven emotions with a
/// color. Returns `None` when no emotion reaches `min_confidence`, which is
/// how a frame without a readable face shows up.
pub fn scores_from_logits(logits: &[f32], min_confidence: f32) -> Result<Option<EmotionScores>> {
    if logits.len() < FERPLUS_CLASSES.len() {
        return Err(anyhow!(
            "unexpected FER+ output length: got {}, need {}",
            logits.len(),
            FERPLUS_CLASSES.len()
        ));
    }
    let logits = &logits[..FERPLUS_CLASSES.len()];
    if logits.iter().any(|v| !v.is_finite()) {
        return Err(anyhow!("FER+ output contains non-finite logits"));
    }

    let max = logits.iter().copied().fold(f32::MIN, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let mut scores = EmotionScores::new();
    for (class, exp) in FERPLUS_CLASSES.iter().zip(&exps) {
        if let Some(emotion) = class {
            scores.set(*emotion, exp / sum);
        }
    }

    let (_, top) = scores.dominant();
    Ok((top >= min_confidence).then_some(scores))
}

/// FER+ expression classifier on ONNX Runtime.
pub struct FerPlusEngine {
    session: Session,
    min_confidence: f32,
}

impl FerPlusEngine {
    pub fn new(model_path: &Path, min_confidence: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;
        Ok(Self {
            session,
            min_confidence,
        })
    }
}

impl ExpressionEngine for FerPlusEngine {
    fn infer(&mut self, frame: &Frame) -> Result<Option<EmotionScores>> {
        let tensor = Tensor::from_array(prepare_face(frame)?)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run FER+ session")?;
        if outputs.len() < 1 {
            return Err(anyhow!("FER+ model returned no outputs"));
        }
        let logits: Vec<f32> = outputs[0].try_extract_array::<f32>()?.iter().copied().collect();
        scores_from_logits(&logits, self.min_confidence)
    }
}
